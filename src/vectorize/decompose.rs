//! Boundary extraction on the pixel-corner grid.
//!
//! Contours walk the corners between pixels, never pixel centers, so a
//! straight run of N pixels costs N unit steps and no diagonals. Each
//! traced contour is XOR-erased from a working copy of the bitmap, which
//! turns the holes inside it into foreground for the next scan. Paths come
//! out in discovery order, outer boundaries before the holes they contain.

use crate::bitmap::Bitmap;
use crate::config::TurnPolicy;
use crate::geom::IPoint;

/// A closed lattice path.
#[derive(Debug, Clone)]
pub struct Path {
    /// Pixel-corner points, y down; consecutive points differ by one unit
    /// step. The closing step from the last point back to the first is
    /// implicit.
    pub points: Vec<IPoint>,
    /// +1 for an outer boundary (the start pixel is foreground in the
    /// source bitmap), -1 for a hole.
    pub sign: i8,
    /// Enclosed area in pixels.
    pub area: i64,
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl Path {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Extract every boundary of a binary bitmap.
///
/// Paths whose area is `<= turd_size` are traced and erased like any
/// other, then dropped.
pub fn decompose(bitmap: &Bitmap, policy: TurnPolicy, turd_size: u32) -> Vec<Path> {
    let mut work = bitmap.copy(|v| u8::from(v != 0));
    let mut paths = Vec::new();
    let mut cursor = 0usize;

    while let Some(start) = find_next(&work, cursor) {
        cursor = start;
        let x = (start % work.width()) as i32;
        let y = (start / work.width()) as i32;
        let sign = if bitmap.is_set(x, y) { 1 } else { -1 };

        let path = find_path(&work, (x, y), sign, policy);
        xor_path(&mut work, &path);
        if path.area > turd_size as i64 {
            paths.push(path);
        }
    }
    paths
}

/// Index of the first set cell at or after `from`, row-major.
fn find_next(bm: &Bitmap, from: usize) -> Option<usize> {
    bm.data()[from..]
        .iter()
        .position(|&v| v != 0)
        .map(|offset| from + offset)
}

/// Walk one boundary starting at the top-left corner of pixel `start`,
/// heading down, with foreground kept on the left.
fn find_path(bm: &Bitmap, start: IPoint, sign: i8, policy: TurnPolicy) -> Path {
    let (x0, y0) = start;
    let (mut x, mut y) = start;
    let (mut dx, mut dy) = (0i32, 1i32);
    let mut path = Path {
        points: Vec::new(),
        sign,
        area: 0,
        min_x: x0,
        max_x: x0,
        min_y: y0,
        max_y: y0,
    };

    loop {
        path.points.push((x, y));
        path.min_x = path.min_x.min(x);
        path.max_x = path.max_x.max(x);
        path.min_y = path.min_y.min(y);
        path.max_y = path.max_y.max(y);

        x += dx;
        y += dy;
        path.area -= x as i64 * dy as i64;

        if (x, y) == start {
            break;
        }

        // Pixels ahead-left and ahead-right of the corner we just reached.
        let left = bm.is_set(x + (dx + dy - 1) / 2, y + (dy - dx - 1) / 2);
        let right = bm.is_set(x + (dx - dy - 1) / 2, y + (dy + dx - 1) / 2);

        let turn_right = if right && !left {
            // Diagonal ambiguity: the two pixels touch only at a corner.
            should_turn_right(bm, policy, sign, x, y)
        } else if right {
            true
        } else if !left {
            false
        } else {
            // Straight on.
            continue;
        };

        (dx, dy) = if turn_right { (-dy, dx) } else { (dy, -dx) };
    }
    path
}

fn should_turn_right(bm: &Bitmap, policy: TurnPolicy, sign: i8, x: i32, y: i32) -> bool {
    match policy {
        TurnPolicy::Right => true,
        TurnPolicy::Left => false,
        TurnPolicy::Black => sign > 0,
        TurnPolicy::White => sign < 0,
        TurnPolicy::Majority => majority(bm, x, y),
        TurnPolicy::Minority => !majority(bm, x, y),
    }
}

/// Is foreground the local majority around corner (x, y)?
///
/// Counts the rings of radius 2, 3 and 4 in turn and answers from the first
/// ring that is not evenly split. A tie on every ring counts as background.
fn majority(bm: &Bitmap, x: i32, y: i32) -> bool {
    let vote = |x: i32, y: i32| if bm.is_set(x, y) { 1 } else { -1 };
    for i in 2..5 {
        let mut ct = 0;
        for a in (-i + 1)..=(i - 1) {
            ct += vote(x + a, y + i - 1);
            ct += vote(x + i - 1, y + a - 1);
            ct += vote(x + a - 1, y - i);
            ct += vote(x - i, y + a);
        }
        if ct != 0 {
            return ct > 0;
        }
    }
    false
}

/// Invert the interior of `path` in the working bitmap.
///
/// Every vertical step flips its row from the step's column out to the
/// path's right edge; pairs of steps cancel outside the contour.
fn xor_path(bm: &mut Bitmap, path: &Path) {
    let Some(&(_, mut y1)) = path.points.first() else {
        return;
    };
    for &(x, y) in &path.points[1..] {
        if y != y1 {
            let row = y1.min(y);
            for col in x..path.max_x {
                bm.flip(col, row);
            }
            y1 = y;
        }
    }
}
