//! Dataset source: in-memory labelled images, an MNIST IDX reader, and synthetic digits.
//!
//! Images are stored flattened (`[n, C*H*W]`) and normalized to `[-1, 1]`, the generator's
//! output range.

use std::path::Path;

use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::config::ImageShape;
use crate::{Error, Result};

const IDX_IMAGES_MAGIC: u32 = 2051;
const IDX_LABELS_MAGIC: u32 = 2049;

/// One training batch.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch, C*H*W]`, values in `[-1, 1]`.
    pub images: Array2<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Labelled images held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    images: Array2<f32>,
    labels: Vec<usize>,
    shape: ImageShape,
    num_classes: usize,
}

impl InMemoryDataset {
    pub fn new(
        images: Array2<f32>,
        labels: Vec<usize>,
        shape: ImageShape,
        num_classes: usize,
    ) -> Result<Self> {
        if images.nrows() != labels.len() {
            return Err(Error::Shape("images and labels must have the same length"));
        }
        if images.ncols() != shape.numel() {
            return Err(Error::Shape("image rows must have C*H*W values"));
        }
        if labels.iter().any(|&l| l >= num_classes) {
            return Err(Error::Domain("label must be < num_classes"));
        }
        Ok(Self {
            images,
            labels,
            shape,
            num_classes,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of full batches per epoch.
    pub fn num_batches(&self, batch_size: usize) -> usize {
        if batch_size == 0 {
            0
        } else {
            self.len() / batch_size
        }
    }

    /// Shuffle once and cut the permutation into disjoint full batches (remainder dropped).
    pub fn epoch_batches(
        &self,
        batch_size: usize,
        rng: &mut impl rand::Rng,
    ) -> Result<EpochBatches<'_>> {
        if batch_size == 0 {
            return Err(Error::Domain("batch_size must be >= 1"));
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        order.truncate(self.num_batches(batch_size) * batch_size);
        Ok(EpochBatches {
            dataset: self,
            order,
            batch_size,
            next: 0,
        })
    }
}

/// Iterator over one epoch's batches.
#[derive(Debug)]
pub struct EpochBatches<'a> {
    dataset: &'a InMemoryDataset,
    order: Vec<usize>,
    batch_size: usize,
    next: usize,
}

impl Iterator for EpochBatches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let start = self.next * self.batch_size;
        let idx = self.order.get(start..start + self.batch_size)?;
        self.next += 1;
        Some(Batch {
            images: self.dataset.images.select(Axis(0), idx),
            labels: idx.iter().map(|&i| self.dataset.labels[i]).collect(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.order.len() / self.batch_size - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for EpochBatches<'_> {}

fn read_be_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let b = bytes
        .get(offset..offset + 4)
        .ok_or(Error::Domain("truncated IDX header"))?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parse an MNIST-style IDX image/label pair into a dataset.
///
/// Pixels are mapped `x / 255` then `(x - 0.5) / 0.5`, i.e. into `[-1, 1]`. Labels must be
/// below `num_classes`.
pub fn parse_idx(image_bytes: &[u8], label_bytes: &[u8], num_classes: usize) -> Result<InMemoryDataset> {
    if read_be_u32(image_bytes, 0)? != IDX_IMAGES_MAGIC {
        return Err(Error::Domain("not an IDX image file"));
    }
    if read_be_u32(label_bytes, 0)? != IDX_LABELS_MAGIC {
        return Err(Error::Domain("not an IDX label file"));
    }
    let n = read_be_u32(image_bytes, 4)? as usize;
    let rows = read_be_u32(image_bytes, 8)? as usize;
    let cols = read_be_u32(image_bytes, 12)? as usize;
    if read_be_u32(label_bytes, 4)? as usize != n {
        return Err(Error::Shape("IDX image and label counts differ"));
    }

    let numel = rows
        .checked_mul(cols)
        .ok_or(Error::Shape("IDX image dimensions overflow"))?;
    let image_end = n
        .checked_mul(numel)
        .and_then(|len| len.checked_add(16))
        .ok_or(Error::Shape("IDX image payload size overflows"))?;
    let label_end = n
        .checked_add(8)
        .ok_or(Error::Shape("IDX label payload size overflows"))?;

    let pixels = image_bytes
        .get(16..image_end)
        .ok_or(Error::Shape("IDX image payload is truncated"))?;
    let labels = label_bytes
        .get(8..label_end)
        .ok_or(Error::Shape("IDX label payload is truncated"))?;

    let images = Array2::from_shape_vec(
        (n, numel),
        pixels
            .iter()
            .map(|&p| (p as f32 / 255.0 - 0.5) / 0.5)
            .collect(),
    )
    .map_err(|_| Error::Shape("IDX image payload has an unexpected length"))?;
    let labels = labels.iter().map(|&l| l as usize).collect();

    InMemoryDataset::new(images, labels, ImageShape::new(1, rows, cols), num_classes)
}

/// Read `train-images-idx3-ubyte` / `train-labels-idx1-ubyte` style files.
pub fn load_idx(
    images_path: impl AsRef<Path>,
    labels_path: impl AsRef<Path>,
    num_classes: usize,
) -> Result<InMemoryDataset> {
    let image_bytes = std::fs::read(images_path)?;
    let label_bytes = std::fs::read(labels_path)?;
    parse_idx(&image_bytes, &label_bytes, num_classes)
}

/// Class-conditional synthetic "digits": class `c` lights a horizontal band whose row depends
/// on `c`, plus Gaussian pixel noise, clamped to `[-1, 1]`.
pub fn synthetic_digits(
    num_classes: usize,
    per_class: usize,
    shape: ImageShape,
    noise: f32,
    seed: u64,
) -> Result<InMemoryDataset> {
    if num_classes == 0 || shape.numel() == 0 {
        return Err(Error::Domain("num_classes and image size must be >= 1"));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = num_classes * per_class;
    let band = (shape.height / num_classes).max(1);
    let mut images = Array2::<f32>::from_elem((n, shape.numel()), -1.0);
    let mut labels = Vec::with_capacity(n);

    for (i, mut row) in images.rows_mut().into_iter().enumerate() {
        let c = i % num_classes;
        labels.push(c);
        let lo = (c * shape.height) / num_classes;
        for ch in 0..shape.channels {
            for y in 0..shape.height {
                let lit = y >= lo && y < lo + band;
                for x in 0..shape.width {
                    let idx = (ch * shape.height + y) * shape.width + x;
                    let base = if lit { 1.0 } else { -1.0 };
                    let z: f32 = StandardNormal.sample(&mut rng);
                    row[idx] = (base + noise * z).clamp(-1.0, 1.0);
                }
            }
        }
    }

    InMemoryDataset::new(images, labels, shape, num_classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn epoch_batches_are_disjoint_and_drop_the_remainder() {
        let shape = ImageShape::new(1, 4, 4);
        let ds = synthetic_digits(3, 7, shape, 0.1, 5).unwrap();
        assert_eq!(ds.len(), 21);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let batches: Vec<Batch> = ds.epoch_batches(4, &mut rng).unwrap().collect();
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|b| b.len() == 4 && b.images.nrows() == 4));

        // Every image row is distinct (noise), so rows identify samples.
        let mut seen = HashSet::new();
        for b in &batches {
            for row in b.images.rows() {
                let key: Vec<u32> = row.iter().map(|v| v.to_bits()).collect();
                assert!(seen.insert(key), "a sample appeared twice in one epoch");
            }
        }
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn epoch_batches_keep_image_label_pairs() {
        let shape = ImageShape::new(1, 10, 3);
        let ds = synthetic_digits(5, 4, shape, 0.0, 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for b in ds.epoch_batches(3, &mut rng).unwrap() {
            for (row, &c) in b.images.rows().into_iter().zip(&b.labels) {
                // Row 2c is inside the band of class c.
                assert_eq!(row[2 * c * 3], 1.0);
            }
        }
    }

    #[test]
    fn idx_roundtrip_normalizes_pixels() {
        let mut img = Vec::new();
        for v in [IDX_IMAGES_MAGIC, 2, 2, 2] {
            img.extend_from_slice(&v.to_be_bytes());
        }
        img.extend_from_slice(&[0, 255, 51, 204, 255, 255, 0, 0]);
        let mut lab = Vec::new();
        for v in [IDX_LABELS_MAGIC, 2] {
            lab.extend_from_slice(&v.to_be_bytes());
        }
        lab.extend_from_slice(&[7, 1]);

        let ds = parse_idx(&img, &lab, 10).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.shape(), ImageShape::new(1, 2, 2));
        assert_eq!(ds.labels, vec![7, 1]);
        assert_eq!(ds.images[[0, 0]], -1.0);
        assert_eq!(ds.images[[0, 1]], 1.0);
        assert!((ds.images[[0, 2]] + 0.6).abs() < 1e-6);

        assert!(parse_idx(&lab, &img, 10).is_err());
        assert!(parse_idx(&img[..20], &lab, 10).is_err());
        assert!(parse_idx(&img, &lab, 5).is_err());
    }

    #[test]
    fn oversized_idx_headers_are_errors() {
        let mut img = Vec::new();
        for v in [IDX_IMAGES_MAGIC, u32::MAX, u32::MAX, u32::MAX] {
            img.extend_from_slice(&v.to_be_bytes());
        }
        let mut lab = Vec::new();
        for v in [IDX_LABELS_MAGIC, u32::MAX] {
            lab.extend_from_slice(&v.to_be_bytes());
        }
        assert!(matches!(parse_idx(&img, &lab, 10), Err(Error::Shape(_))));

        // A plausible count with no payload behind it.
        let mut img = Vec::new();
        for v in [IDX_IMAGES_MAGIC, 1_000, 28, 28] {
            img.extend_from_slice(&v.to_be_bytes());
        }
        let mut lab = Vec::new();
        for v in [IDX_LABELS_MAGIC, 1_000] {
            lab.extend_from_slice(&v.to_be_bytes());
        }
        assert!(matches!(parse_idx(&img, &lab, 10), Err(Error::Shape(_))));
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let shape = ImageShape::new(1, 2, 2);
        let images = Array2::<f32>::zeros((3, 4));
        assert!(InMemoryDataset::new(images.clone(), vec![0, 1], shape, 2).is_err());
        assert!(InMemoryDataset::new(images.clone(), vec![0, 1, 2], shape, 2).is_err());
        assert!(InMemoryDataset::new(images, vec![0, 1, 1], ImageShape::new(1, 3, 3), 2).is_err());
    }
}
