use std::borrow::Cow;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use crate::config::NormalizeConfig;
use crate::error::{BatchingError, Result};
use crate::frame::{FrameInfo, InferObject, PixelFormat};
use crate::model::ModelShapes;
use super::ObjPreproc;

/// Crops an object out of a host-resident packed RGB/BGR frame, resizes it
/// with nearest-neighbour sampling to the model's first input and normalizes
/// it into NHWC RGB floats.
#[derive(Debug, Clone)]
pub struct HostCropResize {
    normalize: NormalizeConfig,
}

impl HostCropResize {
    pub fn new(normalize: NormalizeConfig) -> Self {
        Self { normalize }
    }
}

impl Default for HostCropResize {
    fn default() -> Self {
        Self::new(NormalizeConfig::default())
    }
}

impl ObjPreproc for HostCropResize {
    fn execute(
        &self,
        net_inputs: &mut [&mut [f32]],
        model: &dyn ModelShapes,
        frame: &FrameInfo,
        obj: &InferObject,
    ) -> Result<()> {
        let shape = model.input_shape(0)?;
        if shape.c != 3 {
            return Err(BatchingError::Preprocess(format!(
                "expects a 3 channel model input, input 0 has {} channels",
                shape.c
            )));
        }
        let dst = net_inputs
            .first_mut()
            .ok_or_else(|| BatchingError::Preprocess("no destination buffer for input 0".into()))?;
        if dst.len() != shape.sample_len() {
            return Err(BatchingError::Preprocess(format!(
                "destination holds {} values, model input 0 needs {}",
                dst.len(),
                shape.sample_len()
            )));
        }

        let data = &frame.frame;
        // Component index of R, G and B inside one source pixel.
        let channels: [usize; 3] = match data.fmt {
            PixelFormat::Rgb24 => [0, 1, 2],
            PixelFormat::Bgr24 => [2, 1, 0],
            other => return Err(BatchingError::UnsupportedPixelFormat(other)),
        };
        let src = data.host_plane(0)?;
        let stride = data.stride(0)? as usize;
        let (width, height) = (data.width as usize, data.height as usize);
        if stride < width * 3 || src.len() < stride * height {
            return Err(BatchingError::Preprocess(format!(
                "plane 0 holds {} bytes with stride {}, a {}x{} frame needs more",
                src.len(),
                stride,
                width,
                height
            )));
        }

        let crop = obj
            .bbox
            .crop_rect(data.width, data.height)
            .clamp_to(data.width, data.height)
            .ok_or_else(|| BatchingError::Preprocess(format!("object {:?} lies outside the frame", obj.bbox)))?;

        // Only the rows the crop covers are wrapped; padded rows are repacked.
        let row_bytes = width * 3;
        let (top, bottom) = (crop.top as usize, crop.bottom() as usize);
        let rows = &src[top * stride..bottom * stride];
        let pixels: Cow<'_, [u8]> = if stride == row_bytes {
            Cow::Borrowed(rows)
        } else {
            Cow::Owned(rows.chunks_exact(stride).flat_map(|row| &row[..row_bytes]).copied().collect())
        };
        let band = ImageBuffer::<Rgb<u8>, _>::from_raw(data.width, crop.height as u32, pixels)
            .ok_or_else(|| BatchingError::Preprocess("plane 0 does not cover the crop".into()))?;
        let cropped = imageops::crop_imm(&band, crop.left as u32, 0, crop.width as u32, crop.height as u32);
        let resized = imageops::resize(&*cropped, shape.w, shape.h, FilterType::Nearest);

        let norm = &self.normalize;
        let dst_w = shape.w as usize;
        for (x, y, pixel) in resized.enumerate_pixels() {
            let out = (y as usize * dst_w + x as usize) * 3;
            for (c, &channel) in channels.iter().enumerate() {
                dst[out + c] = (f32::from(pixel[channel]) * norm.scale - norm.mean[c]) / norm.std[c];
            }
        }
        Ok(())
    }
}
