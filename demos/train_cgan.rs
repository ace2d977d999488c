//! Train a conditional GAN on digits and report FID per epoch.
//!
//! Uses MNIST IDX files when both paths are given, otherwise a synthetic digit set:
//!
//! ```text
//! cargo run --release --example train_cgan -- --epochs 5
//! cargo run --release --example train_cgan -- \
//!     --images train-images-idx3-ubyte --labels train-labels-idx1-ubyte
//! ```

use std::path::PathBuf;

use anyhow::Context;
use burn_core::tensor::backend::{AutodiffBackend, Backend};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cgan_fid::config::CganConfig;
use cgan_fid::data::{load_idx, synthetic_digits};
use cgan_fid::features::{ExtractorConfig, RandomConvExtractor};
use cgan_fid::report::TracingSink;
use cgan_fid::trainer::{build_trainer, CganBackend};

type Inner = <CganBackend as AutodiffBackend>::InnerBackend;

#[derive(Parser, Debug)]
#[command(about = "Conditional GAN training with FID evaluation")]
struct Args {
    /// JSON run configuration; fields left out keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// IDX image file (e.g. train-images-idx3-ubyte)
    #[arg(long, requires = "labels")]
    images: Option<PathBuf>,
    /// IDX label file (e.g. train-labels-idx1-ubyte)
    #[arg(long, requires = "images")]
    labels: Option<PathBuf>,
    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// Synthetic samples per class when no IDX files are given
    #[arg(long, default_value_t = 256)]
    per_class: usize,
    /// Write the final training state here as JSON
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print one generated sample per class as ASCII art
    #[arg(long)]
    show_samples: bool,
}

fn ascii(values: &[f32], width: usize) -> String {
    const RAMP: &[u8] = b" .:-=+*#%@";
    values
        .chunks(width)
        .map(|row| {
            row.iter()
                .map(|v| {
                    let t = ((v + 1.0) / 2.0).clamp(0.0, 1.0);
                    RAMP[(t * (RAMP.len() - 1) as f32).round() as usize] as char
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => CganConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => CganConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        cfg.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        cfg.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }

    let dataset = match (&args.images, &args.labels) {
        (Some(images), Some(labels)) => load_idx(images, labels, cfg.num_classes)
            .with_context(|| format!("loading {}", images.display()))?,
        _ => synthetic_digits(cfg.num_classes, args.per_class, cfg.image, 0.2, cfg.seed)?,
    };
    cfg.image = dataset.shape();
    tracing::info!(samples = dataset.len(), shape = ?cfg.image, "dataset ready");

    let device = <CganBackend as Backend>::Device::default();
    let extractor = RandomConvExtractor::<Inner>::new(&device, &ExtractorConfig::default())?;

    let image = cfg.image;
    let num_classes = cfg.num_classes;
    let mut trainer = build_trainer::<CganBackend>(&device, cfg)?;
    let state = trainer.fit(&dataset, &extractor, TracingSink)?.clone();

    if let Some(path) = &args.out {
        std::fs::write(path, serde_json::to_string_pretty(&state)?)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "training state written");
    }

    if args.show_samples {
        let labels: Vec<usize> = (0..num_classes).collect();
        let samples = trainer.generate(&labels, 0)?;
        let values = samples
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("reading samples: {e:?}"))?;
        let per_image = image.numel();
        for (label, img) in values.chunks(per_image).enumerate() {
            // First channel only.
            let plane = &img[..image.height * image.width];
            println!("label {label}:\n{}\n", ascii(plane, image.width));
        }
    }

    Ok(())
}
