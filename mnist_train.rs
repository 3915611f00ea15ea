//! mnist_train - train a configured network on MNIST
//!
//! Expects the four standard IDX files under `--data`:
//! `train-images.idx3-ubyte`, `train-labels.idx1-ubyte`,
//! `t10k-images.idx3-ubyte` and `t10k-labels.idx1-ubyte`.
//!
//! ```bash
//! RUST_LOG=info cargo run --release --bin mnist_train -- \
//!   --config config/cnn.json --data ./data --epochs 3 --csv logs/accuracy.csv
//! ```

use clap::Parser;
use log::info;
use mountain_lake_nn::utils::SimpleRng;
use mountain_lake_nn::{Dataset, NetworkError, NeuralNetwork, Result, Split};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

const IMAGE_MAGIC: u32 = 0x0000_0803;
const LABEL_MAGIC: u32 = 0x0000_0801;

#[derive(Parser)]
#[command(name = "mnist_train", version, about = "Train a configured network on MNIST")]
struct Cli {
    /// JSON network configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Directory holding the MNIST IDX files
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    #[arg(long, default_value_t = 1)]
    epochs: usize,

    /// Seed for weight initialisation and shuffling
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Use at most this many training examples
    #[arg(long)]
    train_limit: Option<usize>,

    /// Use at most this many test examples
    #[arg(long)]
    test_limit: Option<usize>,

    /// Append a `train,test` accuracy row per epoch to this file
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn read_be_u32(data: &[u8], offset: &mut usize) -> Option<u32> {
    let bytes = data.get(*offset..*offset + 4)?;
    *offset += 4;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn truncated(path: &Path, expected: usize, actual: usize) -> NetworkError {
    NetworkError::ShapeMismatch {
        what: format!("bytes in {}", path.display()),
        expected,
        actual,
    }
}

fn check_magic(path: &Path, magic: u32, expected: u32) -> Result<()> {
    if magic != expected {
        return Err(NetworkError::InvalidValue {
            key: format!("{} magic", path.display()),
            value: format!("{magic:#010x}"),
        });
    }
    Ok(())
}

/// Reads up to `limit` images, scaled to [0, 1]. Returns `(rows, cols, pixels)`.
fn read_mnist_images(path: &Path, limit: Option<usize>) -> Result<(usize, usize, Vec<f32>)> {
    let data = fs::read(path)?;
    let mut offset = 0usize;
    let header = |offset: &mut usize| read_be_u32(&data, offset).ok_or_else(|| truncated(path, 16, data.len()));

    check_magic(path, header(&mut offset)?, IMAGE_MAGIC)?;
    let total = header(&mut offset)? as usize;
    let rows = header(&mut offset)? as usize;
    let cols = header(&mut offset)? as usize;

    let count = limit.map_or(total, |limit| limit.min(total));
    let end = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .and_then(|bytes| bytes.checked_add(offset))
        .ok_or_else(|| truncated(path, usize::MAX, data.len()))?;
    let pixels = data
        .get(offset..end)
        .ok_or_else(|| truncated(path, end, data.len()))?;

    Ok((rows, cols, pixels.iter().map(|&p| p as f32 / 255.0).collect()))
}

fn read_mnist_labels(path: &Path, limit: Option<usize>) -> Result<Vec<usize>> {
    let data = fs::read(path)?;
    let mut offset = 0usize;
    let header = |offset: &mut usize| read_be_u32(&data, offset).ok_or_else(|| truncated(path, 8, data.len()));

    check_magic(path, header(&mut offset)?, LABEL_MAGIC)?;
    let total = header(&mut offset)? as usize;

    let count = limit.map_or(total, |limit| limit.min(total));
    let labels = data
        .get(offset..offset + count)
        .ok_or_else(|| truncated(path, offset + count, data.len()))?;

    Ok(labels.iter().map(|&l| l as usize).collect())
}

fn load_mnist(dir: &Path, train_limit: Option<usize>, test_limit: Option<usize>) -> Result<Dataset> {
    let (rows, cols, train_data) = read_mnist_images(&dir.join("train-images.idx3-ubyte"), train_limit)?;
    let train_labels = read_mnist_labels(&dir.join("train-labels.idx1-ubyte"), train_limit)?;
    let (test_rows, test_cols, test_data) =
        read_mnist_images(&dir.join("t10k-images.idx3-ubyte"), test_limit)?;
    let test_labels = read_mnist_labels(&dir.join("t10k-labels.idx1-ubyte"), test_limit)?;

    if (test_rows, test_cols) != (rows, cols) {
        return Err(NetworkError::ShapeMismatch {
            what: "test image size".to_string(),
            expected: rows * cols,
            actual: test_rows * test_cols,
        });
    }
    Dataset::new(rows, cols, train_data, train_labels, test_data, test_labels)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let dataset = load_mnist(&cli.data, cli.train_limit, cli.test_limit)?;
    let train_n = dataset.labels(Split::Train).len();
    info!(
        "loaded MNIST: train {} | test {} | {}x{}",
        train_n,
        dataset.labels(Split::Test).len(),
        dataset.rows(),
        dataset.cols()
    );

    let mut network = NeuralNetwork::from_config_file(&cli.config, dataset, cli.seed)?;
    let mut rng = SimpleRng::new(cli.seed.wrapping_add(1));
    let mut order: Vec<usize> = (0..train_n).collect();

    let mut csv = match &cli.csv {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            Some(OpenOptions::new().create(true).append(true).open(path)?)
        }
        None => None,
    };

    for epoch in 1..=cli.epochs {
        let start = Instant::now();
        rng.shuffle_usize(&mut order);
        let loss = network.train_epoch(&order)?;
        let report = network.evaluate()?;
        info!(
            "epoch {}/{}: mean loss {:.6}, train {:.2}%, test {:.2}%, {:.1}s",
            epoch,
            cli.epochs,
            loss,
            report.train * 100.0,
            report.test * 100.0,
            start.elapsed().as_secs_f32()
        );
        if let Some(file) = csv.as_mut() {
            writeln!(file, "{}", report.csv_row())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn idx_file(dir: &TempDir, name: &str, header: &[u32], body: &[u8]) -> PathBuf {
        let mut bytes: Vec<u8> = header.iter().flat_map(|v| v.to_be_bytes()).collect();
        bytes.extend_from_slice(body);
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_read_images_scales_pixels() {
        let dir = TempDir::new().unwrap();
        let path = idx_file(&dir, "images", &[IMAGE_MAGIC, 2, 1, 2], &[0, 255, 51, 102]);

        let (rows, cols, pixels) = read_mnist_images(&path, Some(1)).unwrap();
        assert_eq!((rows, cols), (1, 2));
        assert_eq!(pixels, vec![0.0, 1.0]);
    }

    #[test]
    fn test_read_images_oversized_header() {
        let dir = TempDir::new().unwrap();
        let path = idx_file(&dir, "images", &[IMAGE_MAGIC, u32::MAX, u32::MAX, u32::MAX], &[]);

        let err = read_mnist_images(&path, None).unwrap_err();
        assert!(matches!(err, NetworkError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_read_labels_truncated_and_bad_magic() {
        let dir = TempDir::new().unwrap();
        let short = idx_file(&dir, "short", &[LABEL_MAGIC, 5], &[1, 2]);
        assert!(matches!(
            read_mnist_labels(&short, None),
            Err(NetworkError::ShapeMismatch { expected: 13, actual: 10, .. })
        ));
        assert_eq!(read_mnist_labels(&short, Some(2)).unwrap(), vec![1, 2]);

        let wrong = idx_file(&dir, "wrong", &[IMAGE_MAGIC, 1], &[1]);
        assert!(matches!(
            read_mnist_labels(&wrong, None),
            Err(NetworkError::InvalidValue { .. })
        ));
    }
}
