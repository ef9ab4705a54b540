use anyhow::Context;
use clap::{Parser, Subcommand};
use image::ImageReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use coinsum::detection::templates::{prepare_templates, TemplatePrep};
use coinsum::{Annotator, CoinDetector, DetectorConfig, Resources, Variant};

#[derive(Parser)]
#[command(name = "coinsum")]
#[command(about = "Detect coins in a photo, classify them and add up their value")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect and classify coins in an image
    Detect {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Detection variant (ignored when --config is given)
        #[arg(long, value_enum, default_value_t = Variant::Contour)]
        variant: Variant,

        /// JSON configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Write the annotated image here
        #[arg(long, value_name = "PNG")]
        out: Option<PathBuf>,

        /// Write the detection report as JSON
        #[arg(long, value_name = "JSON")]
        report: Option<PathBuf>,

        /// Folder of edge templates (template variant)
        #[arg(long, value_name = "DIR")]
        templates: Option<PathBuf>,

        /// Folder of reference coin photos (features variant)
        #[arg(long, value_name = "DIR")]
        references: Option<PathBuf>,

        /// TrueType font for labels
        #[arg(long, value_name = "TTF")]
        font: Option<PathBuf>,

        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        /// Run items through the work queue one at a time
        #[arg(long)]
        executor: bool,
    },

    /// Convert template photos into edge templates
    Templates {
        #[arg(value_name = "IN")]
        input_dir: PathBuf,

        #[arg(value_name = "OUT")]
        output_dir: PathBuf,
    },

    /// Print the default configuration of a variant as JSON
    Config {
        #[arg(long, value_enum, default_value_t = Variant::Contour)]
        variant: Variant,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Detect {
            image_path,
            variant,
            config,
            out,
            report,
            templates,
            references,
            font,
            debug_out,
            executor,
        } => {
            let mut config = match config {
                Some(path) => DetectorConfig::from_json_file(&path)?,
                None => DetectorConfig::for_variant(variant),
            };
            if font.is_some() {
                config.overlay.font_path = font;
            }

            tracing::info!("Loading image: {}", image_path.display());
            let img = ImageReader::open(&image_path)
                .with_context(|| format!("Failed to open {}", image_path.display()))?
                .decode()
                .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
            tracing::info!("Image loaded: {}x{}", img.width(), img.height());

            let resources = Resources::load(&config, templates.as_deref(), references.as_deref())?;
            let mut detector = CoinDetector::new(config, &resources)?.with_executor(executor);
            if let Some(debug_dir) = debug_out {
                detector = detector.with_debug(debug_dir)?;
            }

            let result = detector.detect(&img)?;

            println!("\n=== Coin Detection Results ({}) ===", result.variant);
            println!("Total coins detected: {}", result.coins.len());
            for (i, coin) in result.coins.iter().enumerate() {
                let (x, y) = coin.circle.center();
                println!(
                    "  Coin {} at ({}, {}) r={:.0} - {}",
                    i + 1,
                    x,
                    y,
                    coin.circle.radius,
                    coin.label().unwrap_or_else(|| "unlabelled".to_string())
                );
            }
            println!("{}", result.total_text());

            if let Some(path) = out {
                let annotator = Annotator::new(detector.config().overlay.clone())?;
                annotator
                    .annotate(&img, &result)
                    .save(&path)
                    .with_context(|| format!("Failed to save {}", path.display()))?;
                tracing::info!("Annotated image written to {}", path.display());
            }

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&result)?;
                std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!("Report written to {}", path.display());
            }
        }

        Command::Templates { input_dir, output_dir } => {
            let written = prepare_templates(&input_dir, &output_dir, &TemplatePrep::default())?;
            println!("{} edge templates written to {}", written.len(), output_dir.display());
        }

        Command::Config { variant } => {
            println!("{}", DetectorConfig::for_variant(variant).to_json()?);
        }
    }

    Ok(())
}
