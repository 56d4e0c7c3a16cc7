use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use vesika::{
    config, export, layout, AlphaMatte, AnchorPoint, BoundingBox, Job, LayoutKind, PhotoKind,
};

#[derive(Parser)]
#[command(name = "vesika")]
#[command(version, about = "Biometric and passport photo normalization and print layout")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a photo and write a print-ready page
    Make {
        /// Source image
        #[arg(short, long)]
        input: PathBuf,
        /// Output JPEG
        #[arg(short, long)]
        output: PathBuf,
        /// Face box as X,Y,W,H in source pixels
        #[arg(long, value_parser = parse_face)]
        face: BoundingBox,
        /// Grayscale foreground matte (white = subject)
        #[arg(long)]
        matte: Option<PathBuf>,
        /// Head top as X,Y; skips the edge search
        #[arg(long, value_parser = parse_point)]
        head_top: Option<AnchorPoint>,
        /// biometric, passport or postcard
        #[arg(long, default_value = "biometric")]
        kind: PhotoKind,
        /// Page layout; defaults to the four-up page of the chosen kind
        #[arg(long)]
        layout: Option<LayoutKind>,
        /// Apply the natural retouch to the page
        #[arg(long)]
        retouch: bool,
        /// Print a JSON geometry report
        #[arg(long)]
        report: bool,
    },
    /// Show every page layout in pixels at the configured DPI
    Layouts,
    /// Open config file in editor
    Config,
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N]> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().with_context(|| format!("invalid number {v:?}")))
        .collect::<Result<Vec<_>>>()?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| anyhow::anyhow!("expected {N} comma-separated numbers, got {}", v.len()))
}

fn parse_face(s: &str) -> Result<BoundingBox> {
    let [x, y, w, h] = parse_numbers::<4>(s)?;
    let face = BoundingBox::new(x, y, w, h);
    if !face.is_valid() {
        anyhow::bail!("face box must have a positive width and height");
    }
    Ok(face)
}

fn parse_point(s: &str) -> Result<AnchorPoint> {
    let [x, y] = parse_numbers::<2>(s)?;
    Ok(AnchorPoint::new(x, y))
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(None)?;

    match cli.command {
        Commands::Make {
            input,
            output,
            face,
            matte,
            head_top,
            kind,
            layout,
            retouch,
            report,
        } => {
            let args = MakeArgs {
                input,
                output,
                face,
                matte,
                head_top,
                kind,
                layout: layout.unwrap_or_else(|| kind.default_layout()),
                retouch,
                report,
            };
            make(&cfg, &args)
        }
        Commands::Layouts => layouts(&cfg),
        Commands::Config => open_config(&cfg),
    }
}

struct MakeArgs {
    input: PathBuf,
    output: PathBuf,
    face: BoundingBox,
    matte: Option<PathBuf>,
    head_top: Option<AnchorPoint>,
    kind: PhotoKind,
    layout: LayoutKind,
    retouch: bool,
    report: bool,
}

fn make(cfg: &config::Config, args: &MakeArgs) -> Result<()> {
    info!("Loading {}", args.input.display());
    let source = image::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?
        .to_rgb8();

    let matte = match &args.matte {
        Some(path) => {
            let mask = image::open(path)
                .with_context(|| format!("Failed to open matte {}", path.display()))?
                .to_luma8();
            Some(AlphaMatte::from_luma(&mask))
        }
        None => None,
    };

    let mut pipeline = cfg.pipeline();
    if args.retouch && pipeline.retouch.is_none() {
        pipeline.retouch = Some(Default::default());
    }

    let job = Job {
        source: &source,
        face: args.face,
        matte: matte.as_ref(),
        head_top: args.head_top,
        kind: args.kind,
        layout: args.layout,
    };
    let out = pipeline.process(&job).context("Failed to normalize photo")?;

    export::write_jpeg(&out.page, &args.output, cfg.jpeg_quality, pipeline.dpi)?;
    info!(
        "✓ Wrote {} ({}x{} @ {} dpi)",
        args.output.display(),
        out.page.width(),
        out.page.height(),
        pipeline.dpi
    );

    if args.report {
        println!("{}", serde_json::to_string_pretty(&out.report)?);
    }
    Ok(())
}

fn layouts(cfg: &config::Config) -> Result<()> {
    for kind in LayoutKind::ALL {
        let spec = kind.spec();
        let plan = layout::plan(&spec, cfg.dpi);
        println!(
            "{:<20} page {}x{}  item {}x{}  copies {}",
            kind.name(),
            plan.width,
            plan.height,
            plan.item_width,
            plan.item_height,
            spec.copies()
        );
        for (axis, a) in [("columns", &plan.columns), ("rows", &plan.rows)] {
            println!(
                "    {:<8} lead {:>4}  item {:>4} x{}  gap {:>4}  trail {:>4}  (residual {:+})",
                axis, a.lead, a.item, a.count, a.gap, a.trail, a.residual
            );
        }
        let slots: Vec<String> = plan.slots.iter().map(|(x, y)| format!("({x}, {y})")).collect();
        println!("    slots    {}", slots.join(" "));
    }
    Ok(())
}

fn open_config(cfg: &config::Config) -> Result<()> {
    let config_path = config::CONFIG_PATH.as_path();
    if !config_path.exists() {
        config::save_config(cfg, None).context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
