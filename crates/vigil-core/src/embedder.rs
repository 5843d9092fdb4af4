//! Face descriptor extraction via ONNX Runtime.
//!
//! Wraps an external pretrained descriptor model. The authored logic is
//! only the preprocessing (center crop, resize, normalization) and output
//! validation; the embedding itself is the model's business.

use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5;
/// Descriptor length produced by the model.
pub const EMBED_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} — pass --model or set VIGIL_MODEL_PATH")]
    ModelNotFound(String),
    #[error("frame buffer length {actual} does not match {width}x{height} RGBA")]
    BadFrame { width: u32, height: u32, actual: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ONNX-backed face descriptor extractor.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the descriptor ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded descriptor model"
        );

        Ok(Self { session })
    }

    /// Extract a descriptor from an RGBA frame.
    ///
    /// The largest centered square is cropped, resized to the model input
    /// size, and normalized symmetrically. The caller is responsible for
    /// having a face roughly centered in the frame — face localization is
    /// the capture side's concern, not this module's.
    ///
    /// Descriptors are returned raw (not length-normalized); they are
    /// compared in Euclidean space with an acceptance radius of 0.5.
    pub fn extract(
        &mut self,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<f32>, EmbedderError> {
        let input = Self::preprocess(rgba, width, height)?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        let descriptor: Vec<f32> = raw_data.to_vec();
        if descriptor.len() != EMBED_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim descriptor, got {}",
                descriptor.len()
            )));
        }

        Ok(descriptor)
    }

    /// Center-crop, resize, and normalize a frame into an NCHW float tensor.
    fn preprocess(rgba: &[u8], width: u32, height: u32) -> Result<Array4<f32>, EmbedderError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected || width == 0 || height == 0 {
            return Err(EmbedderError::BadFrame { width, height, actual: rgba.len() });
        }
        let img = image::RgbaImage::from_raw(width, height, rgba.to_vec())
            .ok_or(EmbedderError::BadFrame { width, height, actual: rgba.len() })?;

        let side = width.min(height);
        let x0 = (width - side) / 2;
        let y0 = (height - side) / 2;
        let crop = image::imageops::crop_imm(&img, x0, y0, side, side).to_image();

        let size = EMBED_INPUT_SIZE as u32;
        let resized = image::imageops::resize(&crop, size, size, FilterType::Triangle);

        let size = EMBED_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for y in 0..size {
            for x in 0..size {
                let px = resized.get_pixel(x as u32, y as u32);
                for channel in 0..3 {
                    tensor[[0, channel, y, x]] = (px[channel] as f32 - EMBED_MEAN) / EMBED_STD;
                }
            }
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_frame(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        data
    }

    #[test]
    fn test_preprocess_output_shape() {
        let frame = uniform_frame(320, 240, [128, 128, 128]);
        let tensor = FaceEmbedder::preprocess(&frame, 320, 240).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let frame = uniform_frame(128, 128, [128, 128, 128]);
        let tensor = FaceEmbedder::preprocess(&frame, 128, 128).unwrap();
        let expected = (128.0 - EMBED_MEAN) / EMBED_STD;
        let val = tensor[[0, 0, 0, 0]];
        assert!((val - expected).abs() < 1e-6, "got {val}, expected {expected}");
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let frame = uniform_frame(64, 64, [255, 0, 128]);
        let tensor = FaceEmbedder::preprocess(&frame, 64, 64).unwrap();
        let r = tensor[[0, 0, 10, 10]];
        let g = tensor[[0, 1, 10, 10]];
        let b = tensor[[0, 2, 10, 10]];
        assert!(r > 0.9);
        assert!(g < -0.9);
        assert!(b.abs() < 0.1);
    }

    #[test]
    fn test_preprocess_rejects_short_buffer() {
        assert!(matches!(
            FaceEmbedder::preprocess(&[0u8; 16], 320, 240),
            Err(EmbedderError::BadFrame { .. })
        ));
    }

    #[test]
    fn test_preprocess_handles_wide_frames() {
        // Crop must come from the centered square on a 2:1 frame.
        let frame = uniform_frame(200, 100, [50, 50, 50]);
        let tensor = FaceEmbedder::preprocess(&frame, 200, 100).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE]);
    }
}
