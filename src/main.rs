//! card-capture - Student ID card capture
//!
//! Watches a camera for a card's barcode, waits for the card to settle,
//! reads the printed fields through an OCR service and records validated
//! cards in a CSV file.

mod capture;
mod card;
mod config;
mod dashboard;
mod error;
mod replay;
mod storage;
mod vision;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::capture::{Camera, CaptureSession, Pipeline, StillCamera};
use crate::card::{CardValidator, FieldMatcher};
use crate::config::AppConfig;
use crate::dashboard::{LiveApp, ReplayApp};
use crate::replay::Replay;
use crate::storage::{CaptureCache, RecordStore};
use crate::vision::{BarcodeLocator, CannedRecognizer, CloudVisionClient, TextRecognizer};

/// Student ID card capture
#[derive(Parser, Debug)]
#[command(name = "card-capture")]
#[command(about = "Capture student ID cards from a camera into a CSV file")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Step through cached captures by id instead of using the camera
    #[arg(long, num_args = 1.., conflicts_with_all = ["import", "still"])]
    replay: Vec<String>,

    /// Import every cached capture in a directory into the records file
    #[arg(long, value_name = "DIR", conflicts_with = "still")]
    import: Option<PathBuf>,

    /// Use one still image as the camera
    #[arg(long, value_name = "IMAGE")]
    still: Option<PathBuf>,

    /// OCR service credential (overrides the configured environment variable)
    #[arg(long, value_name = "TOKEN")]
    ocr_token: Option<String>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = config::resolve_config(args.config.as_deref())?;

    if !args.replay.is_empty() {
        run_replay(&config, args.replay)
    } else if let Some(dir) = args.import.clone() {
        run_import(&config, dir)
    } else {
        run_live(&config, &args)
    }?;

    info!("card-capture shutdown complete");
    Ok(())
}

/// Assemble the pipeline around `recognizer`
fn build_pipeline(config: &AppConfig, recognizer: Arc<dyn TextRecognizer>) -> Pipeline {
    let locator = Arc::new(BarcodeLocator::with_config(config.locator.clone()));
    let matcher = FieldMatcher::new(config.schema.fields.clone(), config.matching.clone());
    let validator = CardValidator::new(config.schema.fields.clone(), config.schema.id_length);
    Pipeline::new(locator, recognizer, matcher, validator, config.palette)
}

fn run_live(config: &AppConfig, args: &Args) -> Result<()> {
    let Some(credential) = config.ocr.resolve_credential(args.ocr_token.clone()) else {
        bail!(
            "No OCR credential: pass --ocr-token or set {}",
            config.ocr.credential_env
        );
    };
    let client = CloudVisionClient::new(config.ocr.clone(), Some(credential))?;

    let pipeline = build_pipeline(config, Arc::new(client))
        .with_cache(CaptureCache::new(&config.output.cache_dir));
    let session = CaptureSession::new(Arc::new(pipeline), config.stability.clone());

    let camera = match &args.still {
        Some(path) => {
            info!("Using still image {:?} as the camera", path);
            Camera::new(Box::new(StillCamera::open(path)?), config.camera.flip)
        }
        None => Camera::from_config(&config.camera),
    };

    let store = RecordStore::new(&config.output.records);
    info!("Recording cards to {:?}", store.path());

    let app = LiveApp::new(session, camera, store, config);
    dashboard::run_live(app, &config.window.title)
        .map_err(|e| anyhow::anyhow!("Dashboard error: {}", e))
}

fn run_replay(config: &AppConfig, ids: Vec<String>) -> Result<()> {
    info!("Replaying {} cached capture(s)", ids.len());
    let pipeline = Arc::new(build_pipeline(config, Arc::new(CannedRecognizer::default())));
    let replay = Replay::new(CaptureCache::new(&config.output.cache_dir), ids, pipeline, true);

    let app = ReplayApp::new(replay, None, config);
    dashboard::run_replay(app, &config.window.title)
        .map_err(|e| anyhow::anyhow!("Dashboard error: {}", e))
}

fn run_import(config: &AppConfig, dir: PathBuf) -> Result<()> {
    let pipeline = Arc::new(build_pipeline(config, Arc::new(CannedRecognizer::default())));
    let replay = Replay::from_cache_dir(CaptureCache::new(&dir), pipeline)
        .with_context(|| format!("Failed to read import directory {:?}", dir))?;
    let store = RecordStore::new(&config.output.records);
    info!("Importing into {:?}", store.path());

    let app = ReplayApp::new(replay, Some(store), config);
    dashboard::run_replay(app, &config.window.title)
        .map_err(|e| anyhow::anyhow!("Dashboard error: {}", e))
}
