//! PNG/JPEG images to and from `[1, C, H, W]` tensors in `[0, 1]`.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::TensorData;
use image::{GrayImage, RgbImage};
use srn_core::StereoPair;
use tracing::debug;

use crate::error::ImageError;

type Result<T> = std::result::Result<T, ImageError>;

/// Read an image as an RGB tensor `[1, 3, H, W]` scaled to `[0, 1]`.
pub fn read_rgb<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Tensor<B, 4>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ImageError::Missing(path.to_path_buf()));
    }
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    debug!("Read {} ({}x{})", path.display(), width, height);

    let values: Vec<f32> = rgb.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();
    let hwc = Tensor::<B, 3>::from_data(TensorData::new(values, [height, width, 3]), device);
    Ok(hwc.permute([2, 0, 1]).unsqueeze::<4>())
}

/// Read both views of a pair, requiring equal sizes.
pub fn read_stereo_pair<B: Backend, P: AsRef<Path>>(
    left: P,
    right: P,
    device: &B::Device,
) -> Result<StereoPair<Tensor<B, 4>>> {
    let pair = StereoPair::new(left, right).try_map(|path| read_rgb::<B, _>(path, device))?;
    let (left, right) = (pair.left.dims(), pair.right.dims());
    if left != right {
        return Err(ImageError::SizeMismatch(format!(
            "left view is {}x{}, right view is {}x{}",
            left[3], left[2], right[3], right[2]
        )));
    }
    Ok(pair)
}

/// Write a `[1, C, H, W]` tensor with one or three channels.
///
/// Values are clamped to `[0, 1]` and rounded to 8 bits. Parent
/// directories are created as needed.
pub fn write_rgb<B: Backend, P: AsRef<Path>>(tensor: Tensor<B, 4>, path: P) -> Result<()> {
    let path = path.as_ref();
    let [batch, channels, height, width] = tensor.dims();
    if batch != 1 {
        return Err(ImageError::InvalidTensor(format!(
            "expected a single image, got batch of {}",
            batch
        )));
    }
    if channels != 1 && channels != 3 {
        return Err(ImageError::InvalidTensor(format!(
            "expected 1 or 3 channels, got {}",
            channels
        )));
    }

    let hwc = tensor
        .reshape([channels, height, width])
        .permute([1, 2, 0])
        .clamp(0.0, 1.0);
    let values = hwc
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ImageError::InvalidTensor(format!("{:?}", e)))?;
    let bytes: Vec<u8> = values.into_iter().map(|v| (v * 255.0).round() as u8).collect();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let (w, h) = (width as u32, height as u32);
    let raw_len = bytes.len();
    let invalid = || ImageError::InvalidTensor(format!("{} bytes do not fill {}x{}", raw_len, w, h));
    if channels == 3 {
        RgbImage::from_raw(w, h, bytes).ok_or_else(invalid)?.save(path)?;
    } else {
        GrayImage::from_raw(w, h, bytes).ok_or_else(invalid)?.save(path)?;
    }
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Concatenate equally shaped `[1, C, H, W]` tensors along the batch axis.
pub fn batch_tensors<B: Backend>(tensors: Vec<Tensor<B, 4>>) -> Result<Tensor<B, 4>> {
    let Some(first) = tensors.first() else {
        return Err(ImageError::InvalidTensor("cannot batch an empty list".into()));
    };
    let reference = first.dims();
    for (i, tensor) in tensors.iter().enumerate().skip(1) {
        let dims = tensor.dims();
        if dims[1..] != reference[1..] {
            return Err(ImageError::SizeMismatch(format!(
                "tensor {} has shape {:?}, expected {:?}",
                i, dims, reference
            )));
        }
    }
    Ok(Tensor::cat(tensors, 0))
}
