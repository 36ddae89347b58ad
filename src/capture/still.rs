//! Still-image capture device
//!
//! Serves the same decoded image on every grab. Used for headless runs and
//! for exercising the detection service without a webcam.

use image::RgbImage;
use std::path::Path;
use tracing::debug;

use super::{CaptureDevice, CaptureError};

pub struct StillImageDevice {
    name: String,
    image: RgbImage,
}

impl StillImageDevice {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let image = image::open(path)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{:?}: {}", path, e)))?
            .to_rgb8();

        debug!(
            "Loaded still image {:?} ({}x{})",
            path,
            image.width(),
            image.height()
        );

        Ok(Self::from_image(path.display().to_string(), image))
    }

    pub fn from_image(name: impl Into<String>, image: RgbImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

impl CaptureDevice for StillImageDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        Ok(self.image.clone())
    }
}
