//! Label conditioning: one-hot encoding and fake-label sampling.
//!
//! All encoders allocate and return a fresh matrix.

use ndarray::Array2;

use crate::{Error, Result};

/// One-hot matrix of shape `(batch_size, num_classes)` where every row encodes `label`.
pub fn one_hot(label: usize, batch_size: usize, num_classes: usize) -> Result<Array2<f32>> {
    if label >= num_classes {
        return Err(Error::Domain("label must be < num_classes"));
    }
    let mut out = Array2::<f32>::zeros((batch_size, num_classes));
    out.column_mut(label).fill(1.0);
    Ok(out)
}

/// One-hot matrix of shape `(labels.len(), num_classes)`, row `i` encoding `labels[i]`.
pub fn one_hot_batch(labels: &[usize], num_classes: usize) -> Result<Array2<f32>> {
    if labels.iter().any(|&l| l >= num_classes) {
        return Err(Error::Domain("label must be < num_classes"));
    }
    let mut out = Array2::<f32>::zeros((labels.len(), num_classes));
    for (i, &l) in labels.iter().enumerate() {
        out[[i, l]] = 1.0;
    }
    Ok(out)
}

/// `n` labels drawn uniformly from `[0, num_classes)`.
///
/// Used for the fake conditioning batch; the draw never looks at the true labels.
pub fn sample_uniform_labels(
    rng: &mut impl rand::Rng,
    n: usize,
    num_classes: usize,
) -> Result<Vec<usize>> {
    if num_classes == 0 {
        return Err(Error::Domain("num_classes must be >= 1"));
    }
    Ok((0..n).map(|_| rng.random_range(0..num_classes)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn out_of_range_label_is_rejected() {
        assert!(one_hot(3, 4, 3).is_err());
        assert!(one_hot_batch(&[0, 1, 5], 3).is_err());
    }

    #[test]
    fn one_hot_batch_places_each_row() {
        let y = one_hot_batch(&[2, 0, 1], 3).unwrap();
        assert_eq!(
            y,
            ndarray::array![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        );
    }

    #[test]
    fn fake_labels_are_roughly_uniform() {
        let k = 10usize;
        let n = 50_000usize;
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let labels = sample_uniform_labels(&mut rng, n, k).unwrap();

        let mut counts = vec![0usize; k];
        for l in labels {
            counts[l] += 1;
        }
        let expected = n as f64 / k as f64;
        // Pearson chi-square with 9 dof; 27.88 is the 0.999 quantile.
        let chi2: f64 = counts
            .iter()
            .map(|&c| {
                let r = c as f64 - expected;
                r * r / expected
            })
            .sum();
        assert!(chi2 < 27.88, "chi2={chi2:.2} counts={counts:?}");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]
        #[test]
        fn prop_one_hot_rows(
            k in 1usize..32,
            n in 0usize..64,
            l_raw in any::<usize>(),
        ) {
            let l = l_raw % k;
            let y = one_hot(l, n, k).unwrap();
            prop_assert_eq!(y.dim(), (n, k));
            for row in y.rows() {
                prop_assert_eq!(row.sum(), 1.0);
                for (j, &v) in row.iter().enumerate() {
                    prop_assert_eq!(v, if j == l { 1.0 } else { 0.0 });
                }
            }
        }
    }
}
