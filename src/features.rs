//! Feature extractors used by the FID evaluation.
//!
//! The evaluation only needs "images in, one embedding per image out". Extractors return one
//! feature map per selected block (`[n, features, h, w]`); the FID code pools spatially when
//! `h * w > 1`.
//!
//! Extractors are evaluated on a non-autodiff backend and never handed to an optimizer, so
//! their parameters stay frozen.

use burn_core as burn;

use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::module::{adaptive_avg_pool2d, interpolate};
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::Tensor;
use burn_nn::conv::{Conv2d, Conv2dConfig};
use burn_nn::PaddingConfig2d;

use crate::{Error, Result};

/// Frozen image → feature-map backbone.
pub trait FeatureExtractor<B: Backend> {
    /// Feature maps for `images: [n, 3, H, W]`, one per selected block, ascending block index.
    fn extract(&self, images: Tensor<B, 4>) -> Result<Vec<Tensor<B, 4>>>;
}

/// Per-channel spatial mean of the pixels (`[n, 3, 1, 1]`).
///
/// This is the idealized extractor: embeddings are raw pixel means, so constant images give
/// zero covariance and the distance reduces to the squared mean difference.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelMeanExtractor;

impl<B: Backend> FeatureExtractor<B> for PixelMeanExtractor {
    fn extract(&self, images: Tensor<B, 4>) -> Result<Vec<Tensor<B, 4>>> {
        Ok(vec![images.mean_dim(3).mean_dim(2)])
    }
}

/// Block layout and input handling for [`RandomConvExtractor`].
///
/// The value is immutable once the extractor is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    /// Block indices to return (any order, duplicates ignored); the last one must be `<= 3`.
    pub output_blocks: Vec<usize>,
    /// Bilinear resize of the input to this `[height, width]` before block 0.
    pub resize_to: Option<[usize; 2]>,
    /// Map inputs from `(0, 1)` to `(-1, 1)` via `2x - 1`.
    pub normalize_input: bool,
    /// Output channels of blocks 0..=3.
    pub block_widths: [usize; 4],
}

impl ExtractorConfig {
    /// Index of the final, globally pooled block.
    pub const DEFAULT_BLOCK_INDEX: usize = 3;

    /// Block whose output has `dim` channels, if any.
    pub fn block_index_for_dim(&self, dim: usize) -> Option<usize> {
        self.block_widths.iter().position(|&w| w == dim)
    }
}

impl Default for ExtractorConfig {
    /// Scaled down for a CPU backbone with random weights: a 64 × 64 resize, no input
    /// normalization and narrow blocks. An Inception-style pipeline would resize to 299 × 299
    /// and map `(0, 1)` inputs to `(-1, 1)`; set `resize_to` and `normalize_input` for that.
    fn default() -> Self {
        Self {
            output_blocks: vec![Self::DEFAULT_BLOCK_INDEX],
            resize_to: Some([64, 64]),
            normalize_input: false,
            block_widths: [16, 32, 64, 128],
        }
    }
}

/// A small convolutional backbone with frozen random weights.
///
/// Four stride-2 blocks; the last block ends in `1 × 1` adaptive average pooling. Useful when no
/// pretrained weights are at hand: distances are not comparable with published FIDs, but they
/// are comparable across epochs of one run.
#[derive(Debug)]
pub struct RandomConvExtractor<B: Backend> {
    blocks: Vec<Conv2d<B>>,
    output_blocks: Vec<usize>,
    last_block: usize,
    resize_to: Option<[usize; 2]>,
    normalize_input: bool,
}

impl<B: Backend> RandomConvExtractor<B> {
    pub fn new(device: &B::Device, cfg: &ExtractorConfig) -> Result<Self> {
        let mut output_blocks = cfg.output_blocks.clone();
        output_blocks.sort_unstable();
        output_blocks.dedup();
        let last_block = *output_blocks
            .last()
            .ok_or(Error::Domain("output_blocks must be non-empty"))?;
        if last_block > ExtractorConfig::DEFAULT_BLOCK_INDEX {
            return Err(Error::Domain("last possible output block index is 3"));
        }
        if cfg.block_widths.iter().any(|&w| w == 0) {
            return Err(Error::Domain("block widths must be >= 1"));
        }
        if let Some([h, w]) = cfg.resize_to {
            if h == 0 || w == 0 {
                return Err(Error::Domain("resize_to must be non-empty"));
            }
        }

        let mut blocks = Vec::with_capacity(last_block + 1);
        let mut in_ch = 3;
        for &out_ch in &cfg.block_widths[..=last_block] {
            blocks.push(
                Conv2dConfig::new([in_ch, out_ch], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            in_ch = out_ch;
        }

        Ok(Self {
            blocks,
            output_blocks,
            last_block,
            resize_to: cfg.resize_to,
            normalize_input: cfg.normalize_input,
        })
    }
}

impl<B: Backend> FeatureExtractor<B> for RandomConvExtractor<B> {
    fn extract(&self, images: Tensor<B, 4>) -> Result<Vec<Tensor<B, 4>>> {
        if images.dims()[1] != 3 {
            return Err(Error::Shape("feature extractor expects 3-channel images"));
        }
        let mut x = images;
        if let Some(size) = self.resize_to {
            x = interpolate(x, size, InterpolateOptions::new(InterpolateMode::Bilinear));
        }
        if self.normalize_input {
            x = x.mul_scalar(2.0).sub_scalar(1.0);
        }

        let mut out = Vec::with_capacity(self.output_blocks.len());
        for (idx, conv) in self.blocks.iter().enumerate() {
            x = relu(conv.forward(x));
            if idx == ExtractorConfig::DEFAULT_BLOCK_INDEX {
                x = adaptive_avg_pool2d(x, [1, 1]);
            }
            if self.output_blocks.contains(&idx) {
                out.push(x.clone());
            }
            if idx == self.last_block {
                break;
            }
        }
        Ok(out)
    }
}
