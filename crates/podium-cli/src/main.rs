use anyhow::Result;
use clap::{Parser, Subcommand};
use podium_core::{compare_paths, FaceDetector, OnnxFaceDetector};
use std::path::PathBuf;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "podium", about = "Presenter-change detection for event recordings")]
struct Cli {
    /// Path to the SCRFD detection model (overrides PODIUM_MODEL_DIR)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two frames and report whether the subject changed
    Compare {
        image_a: PathBuf,
        image_b: PathBuf,
        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },
    /// Detect face regions in a single frame (diagnostics)
    Detect { image: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let model_path = match &cli.model {
        Some(path) => path.to_string_lossy().into_owned(),
        None => Config::from_env().detector_model_path(),
    };
    let mut detector = OnnxFaceDetector::load(&model_path)?;

    match cli.command {
        Commands::Compare { image_a, image_b, pretty } => {
            // Degraded results still print and exit 0: a batch of
            // comparisons is never halted by one bad pair.
            let result = compare_paths(&mut detector, &image_a, &image_b);
            let json = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{json}");
        }
        Commands::Detect { image } => {
            let frame = podium_core::loader::load_image(&image)?;
            let regions = detector.detect(&frame.to_luma8())?;
            let report = serde_json::json!({
                "faces": regions.len(),
                "regions": regions,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
