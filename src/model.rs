//! Conditional generator / discriminator (fully-connected, Burn modules).
//!
//! Both networks take a one-hot label next to their main input. Each input goes through its own
//! projection branch; the two branches are concatenated and passed through two more hidden
//! layers.
//!
//! Shapes are checked at the module boundary and reported as [`Error::Shape`].

use burn_core as burn;

use burn::module::{Module, Param};
use burn::tensor::activation::{leaky_relu, relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor, TensorData};
use burn_nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig};
use ndarray::Array2;

use crate::config::{DiscriminatorConfig, GeneratorConfig, NormalInit};
use crate::{Error, Result};

/// Explicit weight-initialization hook.
///
/// Every layer type that owns trainable weights implements this, and the networks delegate to
/// their layers, so the pass is invoked uniformly on a whole model.
pub trait InitializeWeights: Sized {
    fn initialize_weights(self, init: &NormalInit) -> Self;
}

impl<B: Backend> InitializeWeights for Linear<B> {
    /// Weights `~ N(mean, std)`; the bias is left as constructed.
    fn initialize_weights(mut self, init: &NormalInit) -> Self {
        let w = self.weight.val();
        let device = w.device();
        self.weight = Param::from_tensor(Tensor::random(
            w.dims(),
            Distribution::Normal(init.mean, init.std),
            &device,
        ));
        self
    }
}

impl<B: Backend> InitializeWeights for BatchNorm<B> {
    /// Scale `~ N(1, std)`, shift `= 0`.
    fn initialize_weights(mut self, init: &NormalInit) -> Self {
        let gamma = self.gamma.val();
        let device = gamma.device();
        let dims = gamma.dims();
        self.gamma = Param::from_tensor(Tensor::random(
            dims,
            Distribution::Normal(1.0, init.std),
            &device,
        ));
        self.beta = Param::from_tensor(Tensor::zeros(dims, &device));
        self
    }
}

/// Generator: `(noise [n, latent], one-hot [n, classes]) -> image [n, numel]` in `[-1, 1]`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    noise_fc: Linear<B>,
    noise_bn: BatchNorm<B>,
    label_fc: Linear<B>,
    label_bn: BatchNorm<B>,
    hidden_fc: Linear<B>,
    hidden_bn: BatchNorm<B>,
    wide_fc: Linear<B>,
    wide_bn: BatchNorm<B>,
    out_fc: Linear<B>,
    latent_dim: usize,
    num_classes: usize,
    out_dim: usize,
}

impl<B: Backend> Generator<B> {
    pub fn new(
        device: &B::Device,
        cfg: &GeneratorConfig,
        latent_dim: usize,
        num_classes: usize,
        out_dim: usize,
    ) -> Self {
        let branch = cfg.branch_width;
        let [h1, h2] = cfg.hidden_widths;
        Self {
            noise_fc: LinearConfig::new(latent_dim, branch).init(device),
            noise_bn: BatchNormConfig::new(branch).init(device),
            label_fc: LinearConfig::new(num_classes, branch).init(device),
            label_bn: BatchNormConfig::new(branch).init(device),
            hidden_fc: LinearConfig::new(2 * branch, h1).init(device),
            hidden_bn: BatchNormConfig::new(h1).init(device),
            wide_fc: LinearConfig::new(h1, h2).init(device),
            wide_bn: BatchNormConfig::new(h2).init(device),
            out_fc: LinearConfig::new(h2, out_dim).init(device),
            latent_dim,
            num_classes,
            out_dim,
        }
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Flattened image length produced per sample.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[cfg(test)]
    pub(crate) fn output_weight(&self) -> Tensor<B, 2> {
        self.out_fc.weight.val()
    }

    /// Forward pass for a batch.
    ///
    /// Shapes:
    /// - `noise`: `[batch, latent_dim]`
    /// - `labels`: `[batch, num_classes]` (one-hot)
    /// Returns: `[batch, out_dim]`; the caller reshapes to `[batch, C, H, W]`.
    pub fn forward(&self, noise: Tensor<B, 2>, labels: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [n, dz] = noise.dims();
        let [m, dy] = labels.dims();
        if dz != self.latent_dim {
            return Err(Error::Shape("noise width must equal latent_dim"));
        }
        if dy != self.num_classes {
            return Err(Error::Shape("label width must equal num_classes"));
        }
        if n != m {
            return Err(Error::Shape("noise and labels must have the same batch size"));
        }

        let x = relu(self.noise_bn.forward(self.noise_fc.forward(noise)));
        let y = relu(self.label_bn.forward(self.label_fc.forward(labels)));
        let h = Tensor::cat(vec![x, y], 1);
        let h = relu(self.hidden_bn.forward(self.hidden_fc.forward(h)));
        let h = relu(self.wide_bn.forward(self.wide_fc.forward(h)));
        Ok(self.out_fc.forward(h).tanh())
    }
}

impl<B: Backend> InitializeWeights for Generator<B> {
    fn initialize_weights(self, init: &NormalInit) -> Self {
        Self {
            noise_fc: self.noise_fc.initialize_weights(init),
            noise_bn: self.noise_bn.initialize_weights(init),
            label_fc: self.label_fc.initialize_weights(init),
            label_bn: self.label_bn.initialize_weights(init),
            hidden_fc: self.hidden_fc.initialize_weights(init),
            hidden_bn: self.hidden_bn.initialize_weights(init),
            wide_fc: self.wide_fc.initialize_weights(init),
            wide_bn: self.wide_bn.initialize_weights(init),
            out_fc: self.out_fc.initialize_weights(init),
            ..self
        }
    }
}

/// Discriminator: `(image [n, numel], one-hot [n, classes]) -> P(real) [n]` in `(0, 1)`.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    image_fc: Linear<B>,
    label_fc: Linear<B>,
    hidden_fc: Linear<B>,
    hidden_bn: BatchNorm<B>,
    narrow_fc: Linear<B>,
    narrow_bn: BatchNorm<B>,
    out_fc: Linear<B>,
    in_dim: usize,
    num_classes: usize,
    leaky_slope: f64,
}

impl<B: Backend> Discriminator<B> {
    pub fn new(
        device: &B::Device,
        cfg: &DiscriminatorConfig,
        in_dim: usize,
        num_classes: usize,
    ) -> Self {
        let branch = cfg.branch_width;
        let [h1, h2] = cfg.hidden_widths;
        Self {
            image_fc: LinearConfig::new(in_dim, branch).init(device),
            label_fc: LinearConfig::new(num_classes, branch).init(device),
            hidden_fc: LinearConfig::new(2 * branch, h1).init(device),
            hidden_bn: BatchNormConfig::new(h1).init(device),
            narrow_fc: LinearConfig::new(h1, h2).init(device),
            narrow_bn: BatchNormConfig::new(h2).init(device),
            out_fc: LinearConfig::new(h2, 1).init(device),
            in_dim,
            num_classes,
            leaky_slope: cfg.leaky_slope,
        }
    }

    #[cfg(test)]
    pub(crate) fn output_weight(&self) -> Tensor<B, 2> {
        self.out_fc.weight.val()
    }

    /// Forward pass for a batch.
    ///
    /// Shapes:
    /// - `images`: `[batch, in_dim]` (flattened)
    /// - `labels`: `[batch, num_classes]` (one-hot)
    /// Returns: `[batch]`.
    pub fn forward(&self, images: Tensor<B, 2>, labels: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let [n, dx] = images.dims();
        let [m, dy] = labels.dims();
        if dx != self.in_dim {
            return Err(Error::Shape("image width must equal the flattened image size"));
        }
        if dy != self.num_classes {
            return Err(Error::Shape("label width must equal num_classes"));
        }
        if n != m {
            return Err(Error::Shape("images and labels must have the same batch size"));
        }

        let slope = self.leaky_slope;
        let x = leaky_relu(self.image_fc.forward(images), slope);
        let y = leaky_relu(self.label_fc.forward(labels), slope);
        let h = Tensor::cat(vec![x, y], 1);
        let h = leaky_relu(self.hidden_bn.forward(self.hidden_fc.forward(h)), slope);
        let h = leaky_relu(self.narrow_bn.forward(self.narrow_fc.forward(h)), slope);
        Ok(sigmoid(self.out_fc.forward(h)).reshape([n]))
    }
}

impl<B: Backend> InitializeWeights for Discriminator<B> {
    fn initialize_weights(self, init: &NormalInit) -> Self {
        Self {
            image_fc: self.image_fc.initialize_weights(init),
            label_fc: self.label_fc.initialize_weights(init),
            hidden_fc: self.hidden_fc.initialize_weights(init),
            hidden_bn: self.hidden_bn.initialize_weights(init),
            narrow_fc: self.narrow_fc.initialize_weights(init),
            narrow_bn: self.narrow_bn.initialize_weights(init),
            out_fc: self.out_fc.initialize_weights(init),
            ..self
        }
    }
}

pub(crate) fn ndarray_to_burn_2<B: Backend>(device: &B::Device, x: &Array2<f32>) -> Tensor<B, 2> {
    let (n, d) = x.dim();
    // `iter()` walks in logical row-major order regardless of memory layout.
    let data = TensorData::new(x.iter().copied().collect::<Vec<f32>>(), [n, d]);
    Tensor::from_data(data, device)
}
