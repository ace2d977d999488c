//! Static run configuration.
//!
//! Everything here is fixed at process start; nothing is reconfigured while training.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Fixed image layout for a run (`channels × height × width`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub const fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Length of a flattened sample.
    pub const fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        Self::new(1, 28, 28)
    }
}

/// Adam settings for one of the two networks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamSettings {
    pub lr: f64,
    pub beta_1: f32,
    pub beta_2: f32,
}

/// Normal-distribution parameters used by the weight-initialization pass.
///
/// Linear weights are drawn from `N(mean, std)`; normalization scales from `N(1, std)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalInit {
    pub mean: f64,
    pub std: f64,
}

impl Default for NormalInit {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std: 0.02,
        }
    }
}

/// Hidden widths of the generator: `[branch, hidden_1, hidden_2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub branch_width: usize,
    pub hidden_widths: [usize; 2],
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            branch_width: 256,
            hidden_widths: [512, 1024],
        }
    }
}

/// Hidden widths of the discriminator: `[branch, hidden_1, hidden_2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    pub branch_width: usize,
    pub hidden_widths: [usize; 2],
    /// Negative slope of every leaky ReLU.
    pub leaky_slope: f64,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            branch_width: 1024,
            hidden_widths: [512, 256],
            leaky_slope: 0.2,
        }
    }
}

/// Training configuration for the cGAN run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CganConfig {
    /// Number of passes over the dataset.
    pub epochs: usize,
    /// Batch size (constant; remainder batches are dropped).
    pub batch_size: usize,
    /// Generator optimizer.
    pub adam_g: AdamSettings,
    /// Discriminator optimizer.
    pub adam_d: AdamSettings,
    /// Noise dimension.
    pub latent_dim: usize,
    /// Number of label classes.
    pub num_classes: usize,
    pub image: ImageShape,
    pub generator: GeneratorConfig,
    pub discriminator: DiscriminatorConfig,
    /// Emit a batch report whenever `batch % report_every == 0`.
    pub report_every: usize,
    /// Diagonal offset used when the covariance product is singular.
    pub fid_eps: f64,
    /// Optional weight-initialization pass applied once after construction; `None` keeps the
    /// layers' own initializers.
    pub weight_init: Option<NormalInit>,
    /// RNG seed for shuffling, noise and fake labels.
    pub seed: u64,
}

impl Default for CganConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 64,
            adam_g: AdamSettings {
                lr: 1e-4,
                beta_1: 0.5,
                beta_2: 0.999,
            },
            adam_d: AdamSettings {
                lr: 2e-4,
                beta_1: 0.5,
                beta_2: 0.999,
            },
            latent_dim: 100,
            num_classes: 10,
            image: ImageShape::default(),
            generator: GeneratorConfig::default(),
            discriminator: DiscriminatorConfig::default(),
            report_every: 200,
            fid_eps: 1e-6,
            weight_init: None,
            seed: 123,
        }
    }
}

impl CganConfig {
    /// Load a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::Domain("epochs must be >= 1"));
        }
        // BatchNorm and the sample covariance both need at least two rows.
        if self.batch_size < 2 {
            return Err(Error::Domain("batch_size must be >= 2"));
        }
        if self.latent_dim == 0 || self.num_classes == 0 || self.image.numel() == 0 {
            return Err(Error::Domain(
                "latent_dim, num_classes and image size must be >= 1",
            ));
        }
        if self.report_every == 0 {
            return Err(Error::Domain("report_every must be >= 1"));
        }
        for adam in [&self.adam_g, &self.adam_d] {
            if !adam.lr.is_finite() || adam.lr <= 0.0 {
                return Err(Error::Domain("learning rates must be positive and finite"));
            }
            if !(0.0..1.0).contains(&adam.beta_1) || !(0.0..1.0).contains(&adam.beta_2) {
                return Err(Error::Domain("adam betas must lie in [0, 1)"));
            }
        }
        if !self.fid_eps.is_finite() || self.fid_eps <= 0.0 {
            return Err(Error::Domain("fid_eps must be positive and finite"));
        }
        if let Some(init) = &self.weight_init {
            if !init.std.is_finite() || init.std < 0.0 || !init.mean.is_finite() {
                return Err(Error::Domain("weight_init must have finite mean and std >= 0"));
            }
        }
        Ok(())
    }
}
