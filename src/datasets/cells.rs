use std::path::{Path, PathBuf};

use log::debug;
use machine_learning::dataset::Dataset;
use ndarray::{Array2, Axis, concatenate};
use walkdir::WalkDir;

use super::netpbm;
use crate::{ExperimentErr, Result};

pub const MASK_SUFFIX: &str = ".mask.pgm";
pub const SEGMENTED_SUFFIX: &str = ".segmented.pgm";

/// Whether `path` is an input image: a pixmap or graymap that is neither a mask nor a
/// segmentation output.
pub fn is_image(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    (name.ends_with(".ppm") || name.ends_with(".pgm"))
        && !name.ends_with(MASK_SUFFIX)
        && !name.ends_with(SEGMENTED_SUFFIX)
}

/// The mask paired with an image, `<stem>.mask.pgm` next to it.
pub fn mask_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    image.with_file_name(format!("{stem}{MASK_SUFFIX}"))
}

/// Collects the input images under `root` in walking order, with the entries of every directory
/// sorted by file name. Looks `max_depth` levels down.
///
/// # Errors
/// Any directory that can't be read while walking.
pub fn find_images(root: &Path, max_depth: usize) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(root).max_depth(max_depth).sort_by_file_name() {
        let path = entry?.into_path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }

    Ok(images)
}

/// Loads every image of `<dir>/<subset>/` with its mask, one row per pixel: its red, green and
/// blue values against whether the mask is set there.
pub fn load(dir: &Path, subset: &str) -> Result<Dataset> {
    let root = dir.join(subset);
    if !root.is_dir() {
        return Err(ExperimentErr::UnknownSubset(subset.to_string()));
    }

    let images = find_images(&root, 1)?;

    let mut xs = Vec::with_capacity(images.len());
    let mut ys = Vec::with_capacity(images.len());

    for path in &images {
        let image = netpbm::read(path)?;
        let mask = netpbm::read(&mask_path(path))?;

        if (mask.width, mask.height) != (image.width, image.height) {
            return Err(ExperimentErr::Dataset(format!(
                "{} is {}x{} but its mask is {}x{}",
                path.display(),
                image.width,
                image.height,
                mask.width,
                mask.height
            )));
        }

        let y: Vec<f32> = mask
            .samples
            .chunks(mask.channels)
            .map(|pixel| if pixel[0] > 0 { 1. } else { 0. })
            .collect();

        xs.push(image.rgb_rows());
        ys.push(Array2::from_shape_vec((mask.pixels(), 1), y).map_err(|e| {
            ExperimentErr::Dataset(format!("{}: {e}", path.display()))
        })?);
    }

    debug!(subset = subset; "loaded {} cell images", images.len());

    let stack = |parts: Vec<Array2<f32>>, cols: usize| -> Result<Array2<f32>> {
        if parts.is_empty() {
            return Ok(Array2::zeros((0, cols)));
        }
        let views: Vec<_> = parts.iter().map(|a| a.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| ExperimentErr::Dataset(e.to_string()))
    };

    Ok(Dataset::from_parts(stack(xs, 3)?, stack(ys, 1)?)?)
}
