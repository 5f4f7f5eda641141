use image::{Rgba, RgbaImage};
use img2svg::config::TurnPolicy;
use img2svg::vectorize::decompose::decompose;
use img2svg::vectorize::{self, CancelToken};
use img2svg::{as_path_element, as_paths, svg, Bitmap, Histogram, Posterizer, Potrace, Steps, Threshold, TracingConfig};
use proptest::prelude::*;

const POLICIES: [TurnPolicy; 6] = [
    TurnPolicy::Black,
    TurnPolicy::White,
    TurnPolicy::Left,
    TurnPolicy::Right,
    TurnPolicy::Minority,
    TurnPolicy::Majority,
];

fn gray(level: u8) -> Rgba<u8> {
    Rgba([level, level, level, 255])
}

/// Black frame of `size` with a white `inner`×`inner` square in the middle.
fn framed_square(size: u32, inner: u32) -> RgbaImage {
    let lo = (size - inner) / 2;
    let hi = lo + inner;
    RgbaImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            gray(255)
        } else {
            gray(0)
        }
    })
}

/// White image with a black ring: outer square `2..18`, hole `7..13`.
fn ring() -> RgbaImage {
    RgbaImage::from_fn(20, 20, |x, y| {
        let outer = (2..18).contains(&x) && (2..18).contains(&y);
        let hole = (7..13).contains(&x) && (7..13).contains(&y);
        if outer && !hole {
            gray(0)
        } else {
            gray(255)
        }
    })
}

fn scenario_config(opt_curve: bool) -> TracingConfig {
    TracingConfig {
        threshold: Threshold::Level(128),
        steps: Steps::Levels(vec![128]),
        opt_curve,
        ..TracingConfig::default()
    }
}

/// Coordinates of each `M`-started subpath, in order.
fn subpath_numbers(d: &str) -> Vec<Vec<f64>> {
    d.split('M')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.split(|c: char| c.is_whitespace() || c == ',')
                .filter_map(|t| t.parse::<f64>().ok())
                .collect()
        })
        .collect()
}

#[test]
fn framed_square_gives_one_curved_layer() {
    let img = framed_square(10, 4);
    let result = as_paths(img.as_raw(), 10, 10, &scenario_config(true)).unwrap();
    assert_eq!((result.width, result.height, result.dark), (10, 10, false));
    assert_eq!(result.paths.len(), 1);
    let d = &result.paths[0].d;
    assert!(!d.is_empty());
    assert!(d.contains('C'), "{d}");
    assert_eq!(result.paths[0].fill_opacity, 1.0);
}

#[test]
fn unoptimized_boundaries_still_close() {
    let img = framed_square(10, 4);
    let result = as_paths(img.as_raw(), 10, 10, &scenario_config(false)).unwrap();
    assert_eq!(result.paths.len(), 1);
    let subpaths = subpath_numbers(&result.paths[0].d);
    assert_eq!(subpaths.len(), 2);
    for nums in subpaths {
        let n = nums.len();
        assert!(n >= 4);
        assert_eq!(&nums[..2], &nums[n - 2..], "{nums:?}");
    }
}

#[test]
fn ring_yields_opposite_windings() {
    let mut potrace = Potrace::default();
    potrace.load_image(&ring()).unwrap();
    let curves = potrace.curves().unwrap();
    assert_eq!(curves.len(), 2);
    let (outer, hole) = (curves[0].signed_area(), curves[1].signed_area());
    assert!(outer * hole < 0.0, "outer {outer}, hole {hole}");
    assert!(outer.abs() > hole.abs());

    let tag = potrace.get_path_tag(None).unwrap();
    assert!(tag.contains("fill-rule:evenodd"));
    assert_eq!(tag.matches('M').count(), 2);
}

#[test]
fn output_is_deterministic() {
    let img = ring();
    let config = TracingConfig::default();
    let a = as_path_element(img.as_raw(), 20, 20, &config).unwrap();
    let b = as_path_element(img.as_raw(), 20, 20, &config).unwrap();
    assert_eq!(a, b);

    let mut posterizer = Posterizer::default();
    posterizer.load_image(&img).unwrap();
    let first = posterizer.get_svg().unwrap();
    assert_eq!(first, posterizer.get_svg().unwrap());
}

#[test]
fn trivial_images_never_fail() {
    for level in [0u8, 255] {
        let img = RgbaImage::from_pixel(6, 5, gray(level));
        for policy in POLICIES {
            let config = TracingConfig {
                turn_policy: policy,
                ..TracingConfig::default()
            };
            let result = as_paths(img.as_raw(), 6, 5, &config).unwrap();
            assert!(result.paths.iter().all(|p| !p.d.is_empty()));
            as_path_element(img.as_raw(), 6, 5, &config).unwrap();
        }
    }
}

#[test]
fn gradient_posterizes_into_four_layers() {
    let img = RgbaImage::from_fn(256, 4, |x, _| gray(x as u8));
    let config = TracingConfig {
        steps: Steps::Count(4),
        ..TracingConfig::default()
    };
    let result = as_paths(img.as_raw(), 256, 4, &config).unwrap();
    assert_eq!(result.paths.len(), 4);
    let mut opacities: Vec<f64> = result.paths.iter().map(|p| p.fill_opacity).collect();
    assert!(opacities.iter().all(|o| (0.0..=1.0).contains(o)));
    opacities.sort_by(f64::total_cmp);
    opacities.dedup();
    assert_eq!(opacities.len(), 4);
}

#[test]
fn bimodal_histogram_cut_separates_modes() {
    let mut h = Histogram::new();
    for _ in 0..100 {
        h.insert(10);
        h.insert(200);
    }
    let cuts = h.multilevel_thresholding(1, 0..=255);
    assert_eq!(cuts.len(), 1);
    // A cut keeps its own level on the dark side, so 10 already separates.
    assert!((10..200).contains(&cuts[0]), "{cuts:?}");
}

#[test]
fn invalid_options_name_their_field() {
    let mut potrace = Potrace::default();
    for (key, value) in [
        ("turnPolicy", "invalid"),
        ("threshold", "300"),
        ("threshold", "-2"),
        ("optCurve", "yes"),
    ] {
        let err = potrace.set(key, value).unwrap_err();
        assert!(err.to_string().contains(key), "{err}");
    }
}

#[test]
fn alpha_is_composited_over_white() {
    // Fully transparent black reads as white and traces to nothing.
    let img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
    let mut potrace = Potrace::new(TracingConfig {
        threshold: Threshold::Level(128),
        ..TracingConfig::default()
    })
    .unwrap();
    potrace.load_image(&img).unwrap();
    assert_eq!(potrace.get_path_data().unwrap(), "");
}

fn bitmap_from(cells: &[bool], width: usize) -> Bitmap {
    let height = cells.len() / width;
    let mut bm = Bitmap::new(width, height);
    for (i, &on) in cells.iter().enumerate() {
        if on {
            bm.set((i % width) as i32, (i / width) as i32, 1);
        }
    }
    bm
}

fn shoelace(points: &[(i32, i32)]) -> i64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64
        })
        .sum::<i64>()
        / 2
}

proptest! {
    #[test]
    fn tracing_is_deterministic(cells in proptest::collection::vec(any::<bool>(), 144)) {
        let bm = bitmap_from(&cells, 12);
        let config = TracingConfig::default();
        let a = vectorize::trace(&bm, &config, &CancelToken::new()).unwrap();
        let b = vectorize::trace(&bm, &config, &CancelToken::new()).unwrap();
        prop_assert_eq!(svg::render_curves(&a), svg::render_curves(&b));
    }

    #[test]
    fn boundaries_close_and_shrink_with_turd_size(
        cells in proptest::collection::vec(any::<bool>(), 100),
        small in 0u32..4,
        extra in 0u32..6,
    ) {
        let bm = bitmap_from(&cells, 10);
        let fewer = decompose(&bm, TurnPolicy::Minority, small + extra);
        let more = decompose(&bm, TurnPolicy::Minority, small);
        prop_assert!(fewer.len() <= more.len());
        for path in &more {
            let (first, last) = (path.points[0], path.points[path.len() - 1]);
            prop_assert_eq!((first.0 - last.0).abs() + (first.1 - last.1).abs(), 1);
        }
    }

    #[test]
    fn rectangle_area_matches_pixel_count(
        x0 in 0usize..8, y0 in 0usize..8, w in 1usize..8, h in 1usize..8,
    ) {
        let mut bm = Bitmap::new(16, 16);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                bm.set(x as i32, y as i32, 1);
            }
        }
        let paths = decompose(&bm, TurnPolicy::Minority, 0);
        prop_assert_eq!(paths.len(), 1);
        prop_assert_eq!(paths[0].area, (w * h) as i64);
        prop_assert_eq!(shoelace(&paths[0].points).abs(), (w * h) as i64);
    }
}
