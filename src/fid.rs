//! Fréchet Inception Distance (FID).
//!
//! Each image set is embedded by a frozen [`FeatureExtractor`], summarized as a Gaussian
//! `(μ, Σ)`, and the two Gaussians are compared with the squared Fréchet distance
//!
//! \[
//! d^2 = \|\mu_1 - \mu_2\|^2 + \operatorname{tr}\Sigma_1 + \operatorname{tr}\Sigma_2
//!       - 2 \operatorname{tr}\sqrt{\Sigma_1 \Sigma_2}.
//! \]
//!
//! `sqrt` is the principal matrix square root, computed from a complex Schur form
//! `A = Q T Qᴴ` with the upper-triangular recurrence on `T`. When two eigenvalues of the
//! product are both zero, that recurrence divides by zero and the root has non-finite entries.
//! Non-finite entries or a non-converging Schur iteration trigger the diagonal-offset retry.
//!
//! Statistics are accumulated in `f64` regardless of the backend float type.

use burn_core as burn;

use burn::tensor::backend::Backend;
use burn::tensor::module::adaptive_avg_pool2d;
use burn::tensor::Tensor;
use nalgebra::{Complex, DMatrix, Schur};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::features::FeatureExtractor;
use crate::{Error, Result};

/// Default diagonal offset for singular covariance products.
pub const DEFAULT_EPS: f64 = 1e-6;

/// Largest tolerated imaginary magnitude on the diagonal of `sqrt(Σ₁Σ₂)`.
pub const IMAG_DIAG_TOL: f64 = 1e-3;

const SCHUR_MAX_ITER_PER_DIM: usize = 100;

/// Mean vector and covariance matrix of a set of embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianSummary {
    pub mean: Array1<f64>,
    pub cov: Array2<f64>,
}

impl GaussianSummary {
    /// Sample mean and unbiased sample covariance; rows are observations, columns are features.
    pub fn from_embeddings(emb: &ArrayView2<f64>) -> Result<Self> {
        let (n, d) = emb.dim();
        if n < 2 {
            return Err(Error::Shape("need at least two embeddings for a covariance"));
        }
        if d == 0 {
            return Err(Error::Shape("embeddings must have at least one feature"));
        }
        let mean = emb
            .mean_axis(Axis(0))
            .ok_or(Error::Shape("embeddings must be non-empty"))?;
        let centered = emb - &mean;
        let cov = centered.t().dot(&centered) / (n as f64 - 1.0);
        Ok(Self { mean, cov })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// Principal square root of a real square matrix, as a complex matrix.
///
/// The zero matrix is its own root. Non-finite entries are returned as-is (the caller decides
/// whether to retry); only a non-converging Schur iteration is an error.
pub fn sqrtm(a: &Array2<f64>) -> Result<DMatrix<Complex<f64>>> {
    let (n, m) = a.dim();
    if n != m {
        return Err(Error::Shape("sqrtm expects a square matrix"));
    }
    // The Schur solver rescales by the largest entry and cannot start from all zeros.
    if a.iter().all(|&v| v == 0.0) {
        return Ok(DMatrix::zeros(n, n));
    }
    let mc = DMatrix::<Complex<f64>>::from_fn(n, n, |i, j| Complex::new(a[[i, j]], 0.0));
    let schur = Schur::try_new(mc, f64::EPSILON, SCHUR_MAX_ITER_PER_DIM * n.max(1))
        .ok_or(Error::NumericalInstability("schur decomposition did not converge"))?;
    let (q, t) = schur.unpack();
    let r = sqrt_upper_triangular(&t);
    Ok(&q * r * q.adjoint())
}

fn sqrt_upper_triangular(t: &DMatrix<Complex<f64>>) -> DMatrix<Complex<f64>> {
    let n = t.nrows();
    let mut r = DMatrix::<Complex<f64>>::zeros(n, n);
    for j in 0..n {
        r[(j, j)] = t[(j, j)].sqrt();
        for i in (0..j).rev() {
            let mut s = Complex::new(0.0, 0.0);
            for k in (i + 1)..j {
                s += r[(i, k)] * r[(k, j)];
            }
            r[(i, j)] = (t[(i, j)] - s) / (r[(i, i)] + r[(j, j)]);
        }
    }
    r
}

fn all_finite(m: &DMatrix<Complex<f64>>) -> bool {
    m.iter().all(|c| c.re.is_finite() && c.im.is_finite())
}

/// `sqrt(c1 c2)` when the Schur iteration converges and every entry is finite.
fn product_root(c1: &Array2<f64>, c2: &Array2<f64>) -> Option<DMatrix<Complex<f64>>> {
    match sqrtm(&c1.dot(c2)) {
        Ok(root) if all_finite(&root) => Some(root),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(%err, "covariance product has no usable square root");
            None
        }
    }
}

fn add_diag(m: &Array2<f64>, eps: f64) -> Array2<f64> {
    let mut out = m.clone();
    out.diag_mut().mapv_inplace(|v| v + eps);
    out
}

/// Squared Fréchet distance between two Gaussian summaries.
///
/// If `sqrt(Σ₁Σ₂)` is non-finite or the Schur iteration does not converge, `eps` is added to
/// both diagonals and the root recomputed.
/// A diagonal imaginary part above [`IMAG_DIAG_TOL`] is an error; otherwise the imaginary part
/// is dropped.
pub fn frechet_distance(s1: &GaussianSummary, s2: &GaussianSummary, eps: f64) -> Result<f64> {
    let d = s1.dim();
    if s2.dim() != d || s1.cov.dim() != (d, d) || s2.cov.dim() != (d, d) {
        return Err(Error::Shape("gaussian summaries must share one dimension"));
    }
    if !eps.is_finite() || eps <= 0.0 {
        return Err(Error::Domain("eps must be positive and finite"));
    }

    let diff = &s1.mean - &s2.mean;

    let covmean = match product_root(&s1.cov, &s2.cov) {
        Some(root) => root,
        None => {
            tracing::warn!(
                eps,
                "fid calculation produces singular product; adding eps to diagonal of cov estimates"
            );
            let c1 = add_diag(&s1.cov, eps);
            let c2 = add_diag(&s2.cov, eps);
            product_root(&c1, &c2).ok_or(Error::NumericalInstability(
                "matrix square root is unavailable after diagonal offset",
            ))?
        }
    };

    let max_diag_imag = covmean
        .diagonal()
        .iter()
        .fold(0.0f64, |acc, c| acc.max(c.im.abs()));
    if max_diag_imag > IMAG_DIAG_TOL {
        let max_imag = covmean.iter().fold(0.0f64, |acc, c| acc.max(c.im.abs()));
        return Err(Error::ComplexResult { max_imag });
    }
    let tr_covmean: f64 = covmean.diagonal().iter().map(|c| c.re).sum();

    Ok(diff.dot(&diff) + s1.cov.diag().sum() + s2.cov.diag().sum() - 2.0 * tr_covmean)
}

/// Broadcast grayscale images to the 3-channel layout extractors expect.
pub fn to_three_channels<B: Backend>(images: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
    match images.dims()[1] {
        3 => Ok(images),
        1 => Ok(Tensor::cat(vec![images.clone(), images.clone(), images], 1)),
        _ => Err(Error::Shape("images must have 1 or 3 channels")),
    }
}

/// One embedding row per image, taken from the extractor's last returned block.
pub fn embed<B, E>(extractor: &E, images: Tensor<B, 4>) -> Result<Array2<f64>>
where
    B: Backend,
    E: FeatureExtractor<B>,
{
    let n = images.dims()[0];
    let pred = extractor
        .extract(to_three_channels(images)?)?
        .pop()
        .ok_or(Error::Shape("feature extractor returned no blocks"))?;
    let [m, f, h, w] = pred.dims();
    if m != n {
        return Err(Error::Shape("feature extractor changed the batch size"));
    }
    let pred = if h != 1 || w != 1 {
        adaptive_avg_pool2d(pred, [1, 1])
    } else {
        pred
    };
    let act = pred
        .reshape([n, f])
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|_| Error::Shape("feature tensor could not be read as f32"))?;
    Array2::from_shape_vec((n, f), act.into_iter().map(f64::from).collect())
        .map_err(|_| Error::Shape("feature tensor has an unexpected length"))
}

/// Gaussian summary of an image batch's embeddings.
pub fn activation_statistics<B, E>(extractor: &E, images: Tensor<B, 4>) -> Result<GaussianSummary>
where
    B: Backend,
    E: FeatureExtractor<B>,
{
    let act = embed(extractor, images)?;
    GaussianSummary::from_embeddings(&act.view())
}

/// FID between a batch of real and a batch of generated images (`[n, C, H, W]`, `C ∈ {1, 3}`).
pub fn fid<B, E>(extractor: &E, real: Tensor<B, 4>, fake: Tensor<B, 4>, eps: f64) -> Result<f64>
where
    B: Backend,
    E: FeatureExtractor<B>,
{
    let s_real = activation_statistics(extractor, real)?;
    let s_fake = activation_statistics(extractor, fake)?;
    frechet_distance(&s_real, &s_fake, eps)
}
