//! # cgan-fid
//!
//! Conditional GAN training on small digit images, scored with the Fréchet Inception Distance.
//!
//! This crate is intentionally small:
//!
//! - it implements the **adversarial training step**, the **epoch driver**, and the **FID**
//!   evaluation protocol,
//! - it treats the dataset source, the pretrained feature backbone, and the reporting sink as
//!   collaborators behind small seams (`data`, `features::FeatureExtractor`,
//!   `report::ProgressSink`),
//! - it does not ship pretrained weights or a plotting layer.
//!
//! ## Public invariants (must not change)
//!
//! - **Determinism knobs are explicit**: shuffling, noise and fake labels come from a host RNG
//!   seeded by `CganConfig::seed`.
//! - **No hidden normalization**: images are expected in `[-1, 1]`; the generator output range
//!   matches it (tanh).
//! - **Strict step ordering**: the discriminator update uses the pre-update generator output;
//!   the generator update scores that *same* generated batch with the already-updated
//!   discriminator.
//!
//! ## How this maps to the cGAN / FID papers
//!
//! - Mirza & Osindero, *Conditional Generative Adversarial Nets* (arXiv:1411.1784):
//!   both networks see a one-hot label, concatenated after a per-branch projection.
//! - Heusel et al., *GANs Trained by a Two Time-Scale Update Rule Converge to a Local Nash
//!   Equilibrium* (arXiv:1706.08500): the FID as a Fréchet distance between Gaussian fits of
//!   feature embeddings; separate G/D learning rates.
//!
//! ## Module map
//!
//! - `label`: one-hot encoding and uniform fake-label sampling
//! - `model`: generator / discriminator (Burn modules) and the weight-init hook
//! - `trainer`: one adversarial step, the epoch driver, and `TrainingState`
//! - `features`: the feature-extractor seam plus two frozen extractors
//! - `fid`: Gaussian summaries, matrix square root, Fréchet distance
//! - `data`: in-memory dataset, MNIST IDX reader, synthetic digits
//! - `report`: progress reports and sinks
//! - `config`: static run configuration

pub mod config;
pub mod data;
pub mod features;
pub mod fid;
pub mod label;
pub mod model;
pub mod report;
pub mod trainer;

/// cgan-fid error variants.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("shape mismatch: {0}")]
    Shape(&'static str),
    #[error("domain error: {0}")]
    Domain(&'static str),
    #[error("numerical instability: {0}")]
    NumericalInstability(&'static str),
    #[error("imaginary component {max_imag} in matrix square root")]
    ComplexResult { max_imag: f64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
