//! IDX-format image datasets
//!
//! Reads the big-endian IDX files that MNIST-style datasets ship as
//! (magic 2051 for image files, 2049 for label files), optionally
//! gzip-compressed. Pixels are scaled to [0, 1] and flattened into one
//! feature vector per image, ready for a fully-connected classifier.

use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use thiserror::Error;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;

/// Errors for IDX dataset loading
#[derive(Debug, Error)]
pub enum ImageSetError {
    #[error("image set io error: {0}")]
    Io(#[from] io::Error),
    #[error("dataset file not found: '{0}' (also tried '{0}.gz')")]
    NotFound(PathBuf),
    #[error("bad idx magic: expected {expected}, got {got}")]
    BadMagic { expected: u32, got: u32 },
    #[error("{images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },
    #[error("idx payload has {got} bytes, expected {expected}")]
    PayloadSizeMismatch { expected: usize, got: usize },
}

/// A set of flattened images with integer class labels
#[derive(Debug)]
pub struct ImageSet {
    images: Vec<Vec<f32>>,
    labels: Vec<u8>,
    rows: usize,
    cols: usize,
}

impl ImageSet {
    /// Loads an image file and its label file. When a path does not exist
    /// but a `.gz` sibling does, the compressed file is read instead.
    pub fn load(images_path: &Path, labels_path: &Path) -> Result<Self, ImageSetError> {
        let set = Self::from_readers(open_maybe_gz(images_path)?, open_maybe_gz(labels_path)?)?;
        log::info!(
            "loaded {} images ({}x{}) from '{}'",
            set.len(),
            set.rows,
            set.cols,
            images_path.display()
        );
        Ok(set)
    }

    /// Parses raw (already decompressed) IDX streams
    pub fn from_readers(
        images: impl Read,
        labels: impl Read,
    ) -> Result<Self, ImageSetError> {
        let (images, rows, cols) = read_images(images)?;
        let labels = read_labels(labels)?;
        if images.len() != labels.len() {
            return Err(ImageSetError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            images,
            labels,
            rows,
            cols,
        })
    }

    pub fn images(&self) -> &[Vec<f32>] {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Length of each flattened feature vector
    pub fn feature_len(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of distinct classes, assuming labels are 0..=max
    pub fn n_classes(&self) -> usize {
        self.labels.iter().copied().max().map_or(0, |m| m as usize + 1)
    }

    /// Keeps only the first `n` images (scalar autograd makes full-size
    /// training runs slow, so demos subsample)
    pub fn truncate(&mut self, n: usize) {
        self.images.truncate(n);
        self.labels.truncate(n);
    }

    /// Labels as one-hot f32 rows of width `n_classes`
    pub fn one_hot_labels(&self, n_classes: usize) -> Vec<Vec<f32>> {
        self.labels
            .iter()
            .map(|&label| {
                let mut row = vec![0.0; n_classes];
                if (label as usize) < n_classes {
                    row[label as usize] = 1.0;
                }
                row
            })
            .collect()
    }
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>, ImageSetError> {
    if path.extension().is_some_and(|e| e == "gz") {
        return Ok(Box::new(GzDecoder::new(File::open(path)?)));
    }
    if path.exists() {
        return Ok(Box::new(File::open(path)?));
    }
    let mut gz_path = path.as_os_str().to_owned();
    gz_path.push(".gz");
    let gz_path = PathBuf::from(gz_path);
    if gz_path.exists() {
        return Ok(Box::new(GzDecoder::new(File::open(&gz_path)?)));
    }
    Err(ImageSetError::NotFound(path.to_owned()))
}

fn read_images(mut reader: impl Read) -> Result<(Vec<Vec<f32>>, usize, usize), ImageSetError> {
    let magic = reader.read_u32::<BigEndian>()?;
    if magic != IMAGE_MAGIC {
        return Err(ImageSetError::BadMagic {
            expected: IMAGE_MAGIC,
            got: magic,
        });
    }
    let n = reader.read_u32::<BigEndian>()? as usize;
    let rows = reader.read_u32::<BigEndian>()? as usize;
    let cols = reader.read_u32::<BigEndian>()? as usize;

    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    let expected = n * rows * cols;
    if data.len() != expected {
        return Err(ImageSetError::PayloadSizeMismatch {
            expected,
            got: data.len(),
        });
    }

    let images = data
        .chunks_exact(rows * cols)
        .map(|pixels| pixels.iter().map(|&p| p as f32 / 255.0).collect())
        .collect();
    Ok((images, rows, cols))
}

fn read_labels(mut reader: impl Read) -> Result<Vec<u8>, ImageSetError> {
    let magic = reader.read_u32::<BigEndian>()?;
    if magic != LABEL_MAGIC {
        return Err(ImageSetError::BadMagic {
            expected: LABEL_MAGIC,
            got: magic,
        });
    }
    let n = reader.read_u32::<BigEndian>()? as usize;
    let mut labels = Vec::new();
    reader.read_to_end(&mut labels)?;
    if labels.len() != n {
        return Err(ImageSetError::PayloadSizeMismatch {
            expected: n,
            got: labels.len(),
        });
    }
    Ok(labels)
}
