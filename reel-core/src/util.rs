use anyhow::Result;
use candle_core::{DType, IndexOp, Tensor};
use image::RgbImage;

/// Converts a video tensor with values in `[0, 1]` into RGB frames.
///
/// Accepts `(C, T, H, W)` or a single-item batch `(1, C, T, H, W)`.
pub fn tensor_to_frames(video: &Tensor) -> Result<Vec<RgbImage>> {
    let video = match video.rank() {
        5 => {
            let (batch, ..) = video.dims5()?;
            if batch != 1 {
                anyhow::bail!("tensor_to_frames expects a single video, got a batch of {batch}");
            }
            video.i(0)?
        }
        4 => video.clone(),
        rank => anyhow::bail!("tensor_to_frames expects a rank 4 or 5 tensor, got rank {rank}"),
    };

    let (channels, frames, height, width) = video.dims4()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_frames expects 3 channels, got {channels}");
    }

    // (C, T, H, W) -> (T, H, W, C)
    let video = video
        .to_dtype(DType::F32)?
        .clamp(0f32, 1f32)?
        .affine(255.0, 0.0)?
        .round()?
        .to_dtype(DType::U8)?
        .permute((1, 2, 3, 0))?
        .contiguous()?;

    (0..frames)
        .map(|t| -> Result<RgbImage> {
            let pixels = video.i(t)?.flatten_all()?.to_vec1::<u8>()?;
            RgbImage::from_raw(width as u32, height as u32, pixels)
                .ok_or_else(|| anyhow::anyhow!("error converting tensor to frame {t}"))
        })
        .collect()
}
