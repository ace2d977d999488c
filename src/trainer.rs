//! Adversarial training: one cGAN step, the epoch driver, and the run state.
//!
//! Burn provides autodiff and the Adam optimizers; batches, noise and fake labels are built on
//! the host (ndarray + a seeded ChaCha RNG) so a run is reproducible from `CganConfig::seed`.
//!
//! Step protocol (per batch):
//! 1. `D` update on `BCE(D(x, y), 1) + BCE(D(G(z, y').detach(), y'), 0)`.
//! 2. `G` update on `BCE(D'(G(z, y'), y'), 1)`, where `D'` is the discriminator *after* step 1
//!    and `G(z, y')` is the very batch generated in step 1 (no resampling).

use burn_core as burn;

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use burn_optim::{AdamConfig, GradientsParams, Optimizer};
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::config::CganConfig;
use crate::data::{Batch, InMemoryDataset};
use crate::features::FeatureExtractor;
use crate::label::{one_hot_batch, sample_uniform_labels};
use crate::model::{ndarray_to_burn_2, Discriminator, Generator, InitializeWeights};
use crate::report::{BatchReport, EpochReport, ProgressSink};
use crate::{Error, Result};

/// Default burn backend for training: ndarray + autodiff.
pub type CganBackend = Autodiff<NdArray<f32>>;

/// Binary cross-entropy on probabilities, averaged over the batch.
///
/// Log terms are clamped at `-100`, so the loss is finite and non-negative even for
/// saturated probabilities.
pub fn binary_cross_entropy<B: Backend>(probs: Tensor<B, 1>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
    let log_p = probs.clone().log().clamp_min(-100.0);
    let log_not_p = probs.neg().add_scalar(1.0).log().clamp_min(-100.0);
    let not_targets = targets.clone().neg().add_scalar(1.0);
    (targets * log_p + not_targets * log_not_p).mean().neg()
}

/// Losses and the image pair of one step.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    pub d_loss: f32,
    pub g_loss: f32,
    /// `[batch, C*H*W]`
    pub real_images: Tensor<B, 2>,
    /// `[batch, C*H*W]`, the batch used by both updates.
    pub fake_images: Tensor<B, 2>,
    /// Conditioning labels of `fake_images`.
    pub fake_labels: Vec<usize>,
}

/// Mutable run state threaded through the driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Completed epochs.
    pub epoch: usize,
    /// Completed batches over the whole run.
    pub batches_done: usize,
    /// Last discriminator loss of each epoch.
    pub d_losses: Vec<f32>,
    /// Last generator loss of each epoch.
    pub g_losses: Vec<f32>,
    /// FID at the end of each epoch.
    pub fids: Vec<f64>,
}

impl TrainingState {
    pub fn record_epoch(&mut self, d_loss: f32, g_loss: f32, fid: f64) {
        self.d_losses.push(d_loss);
        self.g_losses.push(g_loss);
        self.fids.push(fid);
        self.epoch += 1;
    }

    pub fn avg_d_loss(&self) -> f32 {
        mean(&self.d_losses)
    }

    pub fn avg_g_loss(&self) -> f32 {
        mean(&self.g_losses)
    }
}

fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f32>() / xs.len() as f32
    }
}

/// Generator, discriminator, their optimizers, and the host RNG.
pub struct CganTrainer<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
    optim_g: OG,
    optim_d: OD,
    cfg: CganConfig,
    rng: ChaCha8Rng,
    device: B::Device,
    state: TrainingState,
}

/// Build both networks (plus the optional weight-init pass) and their Adam optimizers.
pub fn build_trainer<B: AutodiffBackend>(
    device: &B::Device,
    cfg: CganConfig,
) -> Result<
    CganTrainer<B, impl Optimizer<Generator<B>, B>, impl Optimizer<Discriminator<B>, B>>,
> {
    cfg.validate()?;

    let mut generator = Generator::<B>::new(
        device,
        &cfg.generator,
        cfg.latent_dim,
        cfg.num_classes,
        cfg.image.numel(),
    );
    let mut discriminator =
        Discriminator::<B>::new(device, &cfg.discriminator, cfg.image.numel(), cfg.num_classes);
    if let Some(init) = &cfg.weight_init {
        generator = generator.initialize_weights(init);
        discriminator = discriminator.initialize_weights(init);
    }

    let optim_g = AdamConfig::new()
        .with_beta_1(cfg.adam_g.beta_1)
        .with_beta_2(cfg.adam_g.beta_2)
        .init::<B, Generator<B>>();
    let optim_d = AdamConfig::new()
        .with_beta_1(cfg.adam_d.beta_1)
        .with_beta_2(cfg.adam_d.beta_2)
        .init::<B, Discriminator<B>>();

    Ok(CganTrainer {
        generator,
        discriminator,
        optim_g,
        optim_d,
        rng: ChaCha8Rng::seed_from_u64(cfg.seed),
        cfg,
        device: device.clone(),
        state: TrainingState::default(),
    })
}

impl<B, OG, OD> CganTrainer<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    pub fn config(&self) -> &CganConfig {
        &self.cfg
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    fn sample_noise(&mut self, n: usize) -> Tensor<B, 2> {
        let mut z = Array2::<f32>::zeros((n, self.cfg.latent_dim));
        for v in z.iter_mut() {
            *v = StandardNormal.sample(&mut self.rng);
        }
        ndarray_to_burn_2::<B>(&self.device, &z)
    }

    /// One discriminator update followed by one generator update.
    pub fn step(&mut self, batch: &Batch) -> Result<StepOutput<B>> {
        let n = batch.len();
        let k = self.cfg.num_classes;
        if n != self.cfg.batch_size || batch.images.nrows() != n {
            return Err(Error::Shape("batch size must equal the configured batch_size"));
        }
        if batch.images.ncols() != self.cfg.image.numel() {
            return Err(Error::Shape("batch images must have C*H*W values"));
        }

        let valid = Tensor::<B, 1>::ones([n], &self.device);
        let fake = Tensor::<B, 1>::zeros([n], &self.device);

        let real_images = ndarray_to_burn_2::<B>(&self.device, &batch.images);
        let real_y = ndarray_to_burn_2::<B>(&self.device, &one_hot_batch(&batch.labels, k)?);

        let noise = self.sample_noise(n);
        let gen_labels = sample_uniform_labels(&mut self.rng, n, k)?;
        let gen_y = ndarray_to_burn_2::<B>(&self.device, &one_hot_batch(&gen_labels, k)?);

        // Discriminator.
        let out_real = self.discriminator.forward(real_images.clone(), real_y)?;
        let d_real_loss = binary_cross_entropy(out_real, valid.clone());

        let gen_imgs = self.generator.forward(noise, gen_y.clone())?;
        let out_fake = self
            .discriminator
            .forward(gen_imgs.clone().detach(), gen_y.clone())?;
        let d_fake_loss = binary_cross_entropy(out_fake, fake);

        let d_loss = d_real_loss + d_fake_loss;
        let grads = d_loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.discriminator);
        self.discriminator =
            self.optim_d
                .step(self.cfg.adam_d.lr, self.discriminator.clone(), grads);

        // Generator: same generated batch, updated discriminator.
        let out_fake = self.discriminator.forward(gen_imgs.clone(), gen_y)?;
        let g_loss = binary_cross_entropy(out_fake, valid);
        let grads = g_loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.generator);
        self.generator = self
            .optim_g
            .step(self.cfg.adam_g.lr, self.generator.clone(), grads);

        self.state.batches_done += 1;

        Ok(StepOutput {
            d_loss: d_loss.into_scalar().elem::<f32>(),
            g_loss: g_loss.into_scalar().elem::<f32>(),
            real_images,
            fake_images: gen_imgs.detach(),
            fake_labels: gen_labels,
        })
    }

    /// Train for `cfg.epochs` epochs, scoring the last batch pair of every epoch with FID.
    pub fn fit<E, S>(
        &mut self,
        dataset: &InMemoryDataset,
        extractor: &E,
        mut sink: S,
    ) -> Result<&TrainingState>
    where
        E: FeatureExtractor<B::InnerBackend>,
        S: ProgressSink,
    {
        if dataset.shape() != self.cfg.image {
            return Err(Error::Shape("dataset image shape must match the config"));
        }
        if dataset.num_classes() != self.cfg.num_classes {
            return Err(Error::Shape("dataset class count must match the config"));
        }
        let batches_per_epoch = dataset.num_batches(self.cfg.batch_size);
        if batches_per_epoch == 0 {
            return Err(Error::Domain("dataset holds fewer samples than one batch"));
        }

        let epochs = self.cfg.epochs;
        tracing::info!(epochs, batches_per_epoch, "starting cGAN training");

        for epoch in self.state.epoch..epochs {
            let batches = dataset.epoch_batches(self.cfg.batch_size, &mut self.rng)?;

            let mut last: Option<StepOutput<B>> = None;
            for (i, batch) in batches.enumerate() {
                let out = self.step(&batch)?;
                if i % self.cfg.report_every == 0 {
                    sink.batch(&BatchReport {
                        epoch,
                        epochs,
                        batch: i,
                        batches_per_epoch,
                        d_loss: out.d_loss,
                        g_loss: out.g_loss,
                    });
                }
                last = Some(out);
            }

            let last = last.ok_or(Error::Domain("epoch produced no batches"))?;
            let fid = self.score(&last, extractor)?;
            tracing::debug!(epoch, fid, "epoch evaluated");

            self.state.record_epoch(last.d_loss, last.g_loss, fid);
            sink.epoch(&EpochReport {
                epoch,
                epochs,
                avg_d_loss: self.state.avg_d_loss(),
                avg_g_loss: self.state.avg_g_loss(),
                fid,
            });
        }

        Ok(&self.state)
    }

    /// FID between the real and generated images of one step.
    pub fn score<E>(&self, out: &StepOutput<B>, extractor: &E) -> Result<f64>
    where
        E: FeatureExtractor<B::InnerBackend>,
    {
        let img = self.cfg.image;
        let shape = [out.real_images.dims()[0], img.channels, img.height, img.width];
        let real = out.real_images.clone().inner().reshape(shape);
        let fake = out.fake_images.clone().inner().reshape(shape);
        crate::fid::fid(extractor, real, fake, self.cfg.fid_eps)
    }

    /// Sample images for `labels` with the generator in inference mode: `[n, C, H, W]`.
    pub fn generate(&self, labels: &[usize], seed: u64) -> Result<Tensor<B::InnerBackend, 4>> {
        let n = labels.len();
        let img = self.cfg.image;
        let device = &self.device;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut z = Array2::<f32>::zeros((n, self.cfg.latent_dim));
        for v in z.iter_mut() {
            *v = StandardNormal.sample(&mut rng);
        }
        let y = one_hot_batch(labels, self.cfg.num_classes)?;

        let generator = self.generator.valid();
        let out = generator.forward(
            ndarray_to_burn_2::<B::InnerBackend>(device, &z),
            ndarray_to_burn_2::<B::InnerBackend>(device, &y),
        )?;
        Ok(out.reshape([n, img.channels, img.height, img.width]))
    }
}

/// Build a trainer from `cfg` and run it to completion.
pub fn train_cgan<B, E, S>(
    device: &B::Device,
    cfg: CganConfig,
    dataset: &InMemoryDataset,
    extractor: &E,
    sink: S,
) -> Result<TrainingState>
where
    B: AutodiffBackend,
    E: FeatureExtractor<B::InnerBackend>,
    S: ProgressSink,
{
    let mut trainer = build_trainer::<B>(device, cfg)?;
    trainer.fit(dataset, extractor, sink).cloned()
}
