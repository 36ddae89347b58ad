//! Capture device abstraction
//!
//! A session acquires exactly one [`CaptureDevice`] on start and releases it
//! on stop. The native webcam backend is only compiled with the `camera`
//! feature; a still-image device covers headless runs.

#[cfg(feature = "camera")]
mod camera;
mod encode;
mod still;

#[cfg(feature = "camera")]
pub use camera::CameraDevice;
use encode::to_data_url;
pub use still::StillImageDevice;

use image::RgbImage;
use std::sync::{Arc, Mutex};

use crate::config::CaptureConfig;

/// Errors from the capture device
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Permission denied or no device present. Fatal to session start.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to grab frame: {0}")]
    Frame(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Trait for capture devices
pub trait CaptureDevice: Send {
    /// Human readable device name
    fn name(&self) -> &str;

    /// Grab the current frame. May block on the device.
    fn grab(&mut self) -> Result<RgbImage, CaptureError>;

    /// Release the underlying device. Called once when the session stops.
    fn release(&mut self) {}
}

/// The session's device, shared with the blocking grab task
pub type SharedDevice = Arc<Mutex<Box<dyn CaptureDevice>>>;

/// Grab one frame and encode it as a JPEG data URL.
///
/// Blocks for as long as the device does; call it from `spawn_blocking`.
pub fn grab_data_url(device: &SharedDevice, quality: u8) -> Result<String, CaptureError> {
    let image = {
        let mut device = device
            .lock()
            .map_err(|_| CaptureError::Frame("capture device lock poisoned".to_string()))?;
        device.grab()?
    };
    to_data_url(&image, quality)
}

/// Release the device once any grab still holding it has finished
pub fn release_device(device: SharedDevice) {
    let release = move || match device.lock() {
        Ok(mut device) => device.release(),
        Err(_) => tracing::warn!("Capture device lock poisoned, dropping it unreleased"),
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(release);
        }
        Err(_) => release(),
    }
}

/// Opens a fresh device for each session
pub type DeviceOpener = Box<dyn FnMut() -> Result<Box<dyn CaptureDevice>, CaptureError> + Send>;

/// Create the device opener for the current build and configuration
pub fn device_opener(config: &CaptureConfig) -> DeviceOpener {
    if let Some(path) = config.still_image.clone() {
        tracing::info!("Using still image {:?} as capture device", path);
        return Box::new(move || {
            let device = StillImageDevice::open(&path)?;
            Ok(Box::new(device) as Box<dyn CaptureDevice>)
        });
    }

    #[cfg(feature = "camera")]
    {
        let index = config.camera_index;
        tracing::info!("Using camera {} as capture device", index);
        Box::new(move || {
            let device = CameraDevice::open(index)?;
            Ok(Box::new(device) as Box<dyn CaptureDevice>)
        })
    }

    #[cfg(not(feature = "camera"))]
    {
        tracing::warn!("Built without the `camera` feature and no still image configured");
        Box::new(|| {
            Err(CaptureError::DeviceUnavailable(
                "camera support not compiled in (enable the `camera` feature or set capture.still_image)"
                    .to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_still_image_is_unavailable() {
        let config = CaptureConfig {
            still_image: Some(std::env::temp_dir().join("proctor-shield-missing.jpg")),
            ..CaptureConfig::default()
        };

        let mut open = device_opener(&config);
        assert!(matches!(open(), Err(CaptureError::DeviceUnavailable(_))));
    }

    struct CountingDevice {
        released: Arc<Mutex<u32>>,
    }

    impl CaptureDevice for CountingDevice {
        fn name(&self) -> &str {
            "counting"
        }

        fn grab(&mut self) -> Result<RgbImage, CaptureError> {
            Ok(RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30])))
        }

        fn release(&mut self) {
            *self.released.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_grab_data_url_and_release() {
        let released = Arc::new(Mutex::new(0));
        let device: SharedDevice = Arc::new(Mutex::new(Box::new(CountingDevice {
            released: Arc::clone(&released),
        })));

        let url = grab_data_url(&device, 80).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));

        // no runtime here, so the release runs inline
        release_device(device);
        assert_eq!(*released.lock().unwrap(), 1);
    }
}
