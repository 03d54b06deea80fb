//! Stereo dataset layout.
//!
//! ```text
//! root/
//!   input/left/0001_left.png    input/right/0001_right.png
//!   gt/left/0001_left.png       gt/right/0001_right.png     (optional)
//! ```
//!
//! The right view of any left path is found by swapping the `left`
//! directory for `right` and replacing `left` with `right` in the file name.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use srn_core::StereoPair;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::ImageError;

pub const INPUT_DIR: &str = "input";
pub const TARGET_DIR: &str = "gt";

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One stereo input pair and, when available, its ground truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StereoSample {
    /// File name of the left view
    pub name: String,
    pub input: StereoPair<PathBuf>,
    pub target: Option<StereoPair<PathBuf>>,
}

/// Right-view path for a left-view path.
///
/// Returns `None` when neither the parent directory nor the file name
/// mentions `left`.
pub fn derive_right_path(left: &Path) -> Option<PathBuf> {
    let file_name = left.file_name()?.to_str()?;
    let parent = left.parent().unwrap_or_else(|| Path::new(""));

    let (parent, dir_swapped) = match parent.file_name().and_then(OsStr::to_str) {
        Some(dir) if dir.contains("left") => (
            parent.with_file_name(dir.replace("left", "right")),
            true,
        ),
        _ => (parent.to_path_buf(), false),
    };
    if !dir_swapped && !file_name.contains("left") {
        return None;
    }
    Some(parent.join(file_name.replace("left", "right")))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Sorted `(name, pair)` entries for every left image in `left_dir` with an
/// existing right counterpart.
pub fn discover_pairs(left_dir: &Path) -> Result<Vec<(String, StereoPair<PathBuf>)>, ImageError> {
    if !left_dir.is_dir() {
        return Err(ImageError::Missing(left_dir.to_path_buf()));
    }

    let mut lefts: Vec<PathBuf> = WalkDir::new(left_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", left_dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    lefts.sort();

    let mut pairs = Vec::with_capacity(lefts.len());
    for left in lefts {
        let Some(right) = derive_right_path(&left) else {
            warn!("Cannot derive a right view for {}", left.display());
            continue;
        };
        if !right.is_file() {
            warn!("Right view {} missing, skipping", right.display());
            continue;
        }
        let name = left
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pairs.push((name, StereoPair::new(left, right)));
    }
    Ok(pairs)
}

/// Samples under `root/input`, with targets from `root/gt` where both
/// views exist.
pub fn discover_samples(root: &Path) -> Result<Vec<StereoSample>, ImageError> {
    let input_left = root.join(INPUT_DIR).join("left");
    let target_left = root.join(TARGET_DIR).join("left");

    let samples: Vec<StereoSample> = discover_pairs(&input_left)?
        .into_iter()
        .map(|(name, input)| {
            let left = target_left.join(&name);
            let target = derive_right_path(&left)
                .filter(|right| left.is_file() && right.is_file())
                .map(|right| StereoPair::new(left, right));
            StereoSample { name, input, target }
        })
        .collect();

    let with_target = samples.iter().filter(|s| s.target.is_some()).count();
    info!(
        "Found {} stereo pairs in {} ({} with ground truth)",
        samples.len(),
        root.display(),
        with_target
    );
    Ok(samples)
}
