use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use img2svg::vectorize::curve::Tag;
use img2svg::{bitmap, render, Posterizer, Potrace, TracingConfig};

#[derive(Parser)]
#[command(name = "img2svg", about = "Raster image to SVG path outlines")]
struct Cli {
    /// Input image path (PNG, JPEG, BMP, GIF)
    #[arg(short, long)]
    input: PathBuf,

    /// Output SVG path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ambiguous-turn rule: black, white, left, right, minority, majority
    #[arg(long)]
    turn_policy: Option<String>,

    /// Drop boundaries enclosing this many pixels or fewer
    #[arg(long)]
    turd_size: Option<String>,

    /// Corner threshold (0 = polygon, 1.3334 = no corners)
    #[arg(long)]
    alpha_max: Option<String>,

    /// Merge smooth segments into fewer curves: true or false
    #[arg(long)]
    opt_curve: Option<String>,

    /// Maximum deviation a merged curve may introduce
    #[arg(long)]
    opt_tolerance: Option<String>,

    /// Luminance threshold 0-255, or auto
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<String>,

    /// Trace dark shapes on light background: true or false
    #[arg(long)]
    black_on_white: Option<String>,

    /// Layer count, auto, or a level list like [50,120,200]
    #[arg(long)]
    steps: Option<String>,

    /// Layer tone: spread, dominant, median, mean
    #[arg(long)]
    fill_strategy: Option<String>,

    /// Layer threshold placement: auto or equal
    #[arg(long)]
    range_distribution: Option<String>,

    /// Fill color (CSS), or auto
    #[arg(long)]
    color: Option<String>,

    /// Background color (CSS); transparent if omitted
    #[arg(long)]
    background: Option<String>,

    /// Refuse images with more pixels than this
    #[arg(long)]
    max_pixels: Option<String>,

    /// Emit stacked gray layers instead of a single path
    #[arg(long)]
    posterize: bool,

    /// Re-rasterize the trace and report pixel agreement with the source
    #[arg(long)]
    compare: bool,

    /// Write a diff PNG of the raster comparison (implies --compare)
    #[arg(long)]
    diff: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> img2svg::TraceResult<TracingConfig> {
        let mut config = TracingConfig::default();
        let options = [
            ("turnPolicy", &self.turn_policy),
            ("turdSize", &self.turd_size),
            ("alphaMax", &self.alpha_max),
            ("optCurve", &self.opt_curve),
            ("optTolerance", &self.opt_tolerance),
            ("threshold", &self.threshold),
            ("blackOnWhite", &self.black_on_white),
            ("steps", &self.steps),
            ("fillStrategy", &self.fill_strategy),
            ("rangeDistribution", &self.range_distribution),
            ("color", &self.color),
            ("background", &self.background),
            ("maxPixels", &self.max_pixels),
        ];
        for (key, value) in options {
            if let Some(value) = value {
                config.set(key, value)?;
            }
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.config()?;
    let t_start = Instant::now();

    eprintln!();
    eprintln!("  img2svg \u{00b7} {}", cli.input.display());
    eprintln!();

    let img = bitmap::open_rgba(&cli.input)?;
    let mut potrace = Potrace::new(config.clone())?;
    potrace.load_image(&img)?;
    let (w, h) = (potrace.width()?, potrace.height()?);
    eprintln!("  Load        {}x{} px, threshold {}", w, h, potrace.threshold()?);

    let svg = if cli.posterize {
        let mut posterizer = Posterizer::new(config)?;
        posterizer.load_image(&img)?;
        let ranges = posterizer.ranges()?;
        let levels: Vec<String> = ranges.iter().map(|s| s.value.to_string()).collect();
        eprintln!("  Posterize   {} ranges at [{}]", ranges.len(), levels.join(", "));
        let svg = posterizer.get_svg()?;
        eprintln!("  Trace       {} layers", svg.matches("<path ").count());
        svg
    } else {
        let curves = potrace.curves()?;
        let segments = curves.iter().flat_map(|c| &c.segments);
        let corners = segments.clone().filter(|s| s.tag == Tag::Corner).count();
        let total = segments.count();
        eprintln!(
            "  Trace       {} paths \u{2192} {} curves + {} corners",
            curves.len(),
            total - corners,
            corners
        );
        potrace.get_svg()?
    };

    if cli.compare || cli.diff.is_some() {
        let binary = potrace.binary()?;
        let curves = potrace.curves()?;
        let cmp = render::raster_compare(curves, &binary);
        eprintln!(
            "  Raster IoU  {:.1}%  (overlap={} traced={} source={})",
            cmp.iou * 100.0,
            cmp.overlap_px,
            cmp.traced_px,
            cmp.source_px
        );
        if let Some(diff) = &cli.diff {
            render::write_diff_png(curves, &binary, diff)?;
            eprintln!("  Diff        {}", diff.display());
        }
    }

    match &cli.output {
        Some(path) => std::fs::write(path, &svg)?,
        None => print!("{svg}"),
    }

    eprintln!(
        "  Result      {} bytes of SVG  ({}ms)",
        svg.len(),
        t_start.elapsed().as_millis()
    );
    if let Some(path) = &cli.output {
        eprintln!();
        eprintln!("  \u{2713} {}", path.display());
    }
    eprintln!();
    Ok(())
}
