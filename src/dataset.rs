//! Training corpus record
//!
//! Row-major example matrices and integer labels for a training and a test
//! split. Every example is a `rows × cols` image flattened to one row.

use crate::error::{NetworkError, Result};

/// Which half of the corpus to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: usize,
    cols: usize,
    train_data: Vec<f32>,
    train_labels: Vec<usize>,
    test_data: Vec<f32>,
    test_labels: Vec<usize>,
}

impl Dataset {
    /// Builds a corpus, checking that every data buffer holds exactly one
    /// `rows × cols` example per label.
    pub fn new(
        rows: usize,
        cols: usize,
        train_data: Vec<f32>,
        train_labels: Vec<usize>,
        test_data: Vec<f32>,
        test_labels: Vec<usize>,
    ) -> Result<Self> {
        for (what, data, labels) in [
            ("training data", &train_data, &train_labels),
            ("test data", &test_data, &test_labels),
        ] {
            let expected = rows
                .checked_mul(cols)
                .and_then(|size| size.checked_mul(labels.len()))
                .unwrap_or(usize::MAX);
            if data.len() != expected {
                return Err(NetworkError::ShapeMismatch {
                    what: what.to_string(),
                    expected,
                    actual: data.len(),
                });
            }
        }
        Ok(Self {
            rows,
            cols,
            train_data,
            train_labels,
            test_data,
            test_labels,
        })
    }

    /// Rows of a single example.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Columns of a single example.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Values per example.
    pub fn example_size(&self) -> usize {
        self.rows * self.cols
    }

    pub fn len(&self, split: Split) -> usize {
        self.labels(split).len()
    }

    pub fn is_empty(&self, split: Split) -> bool {
        self.len(split) == 0
    }

    pub fn labels(&self, split: Split) -> &[usize] {
        match split {
            Split::Train => &self.train_labels,
            Split::Test => &self.test_labels,
        }
    }

    /// The flattened example at `index` and its label.
    pub fn example(&self, split: Split, index: usize) -> Result<(&[f32], usize)> {
        let labels = self.labels(split);
        let label = *labels.get(index).ok_or(NetworkError::ExampleOutOfRange {
            index,
            count: labels.len(),
        })?;
        let data = match split {
            Split::Train => &self.train_data,
            Split::Test => &self.test_data,
        };
        let size = self.example_size();
        Ok((&data[index * size..(index + 1) * size], label))
    }
}
