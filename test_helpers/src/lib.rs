//! Test helpers for cellraster
//!
//! Synthetic images and label masks with known structure, plus a shared
//! directory for test artifacts.

use ndarray::{s, Array2, Array3};
use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};

/// Error type for test helper operations
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to find project root: {0}")]
    ProjectRootNotFound(String),
}

/// Walk up from the current directory to the workspace `Cargo.toml`.
/// Stops at the first manifest declaring `[workspace]`.
pub fn find_project_root() -> Result<PathBuf, TestHelperError> {
    let mut current_dir = env::current_dir().map_err(|e| {
        TestHelperError::ProjectRootNotFound(format!("Failed to get current directory: {e}"))
    })?;

    loop {
        let cargo_toml = current_dir.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = std::fs::read_to_string(&cargo_toml).map_err(|e| {
                TestHelperError::ProjectRootNotFound(format!("Failed to read Cargo.toml: {e}"))
            })?;
            if content.contains("[workspace]") {
                return Ok(current_dir);
            }
        }
        if !current_dir.pop() {
            break;
        }
    }

    Err(TestHelperError::ProjectRootNotFound(
        "Workspace root not found".to_string(),
    ))
}

/// Workspace root, resolved once per test binary
static PROJECT_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_project_root().expect("Failed to find project root directory"));

/// Directory for plots written by tests, created on first use.
pub fn get_output_dir() -> PathBuf {
    let output_dir = PROJECT_ROOT.join("test_output");
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    }
    output_dir
}

/// Path of a test artifact such as a rendered plot inside `test_output/`.
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// Deterministic `[height, width, channels]` intensities.
///
/// Channel `c` is a diagonal gradient offset by `seed` and scaled by
/// `c + 1`, so channels differ in range and no channel is constant.
pub fn gradient_channels(height: usize, width: usize, channels: usize, seed: u32) -> Array3<f64> {
    Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
        let base = ((x + 2 * y + seed as usize * 7) % 251) as f64;
        base * (c + 1) as f64
    })
}

/// Two rectangular cells with ids 1 and 2 on background.
///
/// Cell 1 spans rows 1..5 and columns 1..4, cell 2 rows 2..6 and columns
/// 5..9 of a 8x10 mask.
pub fn two_rectangle_mask() -> Array2<u32> {
    let mut labels = Array2::zeros((8, 10));
    labels.slice_mut(s![1..5, 1..4]).fill(1);
    labels.slice_mut(s![2..6, 5..9]).fill(2);
    labels
}

/// `rows x cols` square cells of side `size`, separated by one background
/// pixel, numbered from 1 in row-major order.
pub fn grid_mask(rows: usize, cols: usize, size: usize) -> Array2<u32> {
    let step = size + 1;
    let mut labels = Array2::zeros((rows * step + 1, cols * step + 1));
    for r in 0..rows {
        for c in 0..cols {
            let (y, x) = (1 + r * step, 1 + c * step);
            labels
                .slice_mut(s![y..y + size, x..x + size])
                .fill((r * cols + c + 1) as u32);
        }
    }
    labels
}
