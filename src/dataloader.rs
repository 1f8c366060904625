//! Mini-batch data loading

use std::collections::HashSet;

use rand::seq::SliceRandom;
use thiserror::Error;

use crate::autograd::Var;

/// Errors for the data loader
#[derive(Debug, Error)]
pub enum DataLoaderError {
    #[error(
        "all feature rows must have the same dimension, received different sizes: {input_dims:?}"
    )]
    InputDimensionMismatch { input_dims: HashSet<usize> },
    #[error("labels must have the same length as the data: {label_len} labels, {data_len} rows")]
    LabelLengthMismatch { label_len: usize, data_len: usize },
}

/// Returns batches of feature rows and one-hot label rows, optionally
/// shuffled each pass. Takes inspiration from the PyTorch DataLoader.
/// <https://pytorch.org/docs/stable/data.html#torch.utils.data.DataLoader>
pub struct DataLoader {
    data: Vec<Vec<Var>>,
    // one-hot encoded labels
    labels: Vec<Vec<Var>>,
    batch_size: usize,
    shuffle: bool,
}

impl DataLoader {
    pub fn new(
        data: Vec<Vec<f32>>,
        labels: Vec<Vec<f32>>,
        batch_size: usize,
        shuffle: bool,
    ) -> Result<Self, DataLoaderError> {
        if data.len() != labels.len() {
            return Err(DataLoaderError::LabelLengthMismatch {
                label_len: labels.len(),
                data_len: data.len(),
            });
        }
        let input_dims = data.iter().map(|d| d.len()).collect::<HashSet<_>>();
        if input_dims.len() > 1 {
            return Err(DataLoaderError::InputDimensionMismatch { input_dims });
        }
        let data = data
            .iter()
            .map(|d| d.iter().map(|v| Var::new(*v)).collect())
            .collect();
        let labels = labels
            .iter()
            .map(|l| l.iter().map(|v| Var::new(*v)).collect())
            .collect();
        Ok(Self {
            data,
            labels,
            batch_size,
            shuffle,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[cfg(test)]
    fn seeded_iter(&self, seed: u64) -> DataLoaderIterator<'_> {
        use rand::SeedableRng;
        use rand_pcg::Pcg64Mcg;

        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let mut indices = (0..self.data.len()).collect::<Vec<_>>();
        indices.shuffle(&mut rng);
        DataLoaderIterator {
            data: &self.data,
            labels: &self.labels,
            batch_size: self.batch_size,
            indices,
            curr_iter: 0,
        }
    }

    pub fn iter(&self) -> DataLoaderIterator<'_> {
        let mut indices = (0..self.data.len()).collect::<Vec<_>>();
        if self.shuffle {
            indices.shuffle(&mut rand::rng());
        }
        DataLoaderIterator {
            data: &self.data,
            labels: &self.labels,
            batch_size: self.batch_size,
            indices,
            curr_iter: 0,
        }
    }
}

/// Yields mini batches of data and labels until the dataset is exhausted.
/// The final batch may be smaller than `batch_size`; no rows are dropped.
pub struct DataLoaderIterator<'a> {
    data: &'a [Vec<Var>],
    labels: &'a [Vec<Var>],
    batch_size: usize,
    // optionally shuffled indices
    indices: Vec<usize>,
    curr_iter: usize,
}

impl<'a> Iterator for DataLoaderIterator<'a> {
    type Item = (Vec<&'a [Var]>, Vec<&'a [Var]>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.curr_iter >= self.data.len() {
            return None;
        }
        let end = (self.curr_iter + self.batch_size).min(self.data.len());
        let batch_data = self.indices[self.curr_iter..end]
            .iter()
            .map(|&i| self.data[i].as_slice())
            .collect::<Vec<_>>();
        let batch_labels = self.indices[self.curr_iter..end]
            .iter()
            .map(|&i| self.labels[i].as_slice())
            .collect::<Vec<_>>();
        self.curr_iter = end;
        Some((batch_data, batch_labels))
    }
}
