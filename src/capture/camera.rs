//! Native webcam backend
//!
//! The camera handle lives on a dedicated worker thread for its whole
//! lifetime; grabs are requests over a channel. Dropping the request sender
//! ends the worker, which stops the stream and releases the device.

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CaptureDevice, CaptureError};

const GRAB_TIMEOUT: Duration = Duration::from_secs(2);

type FrameReply = mpsc::SyncSender<Result<RgbImage, String>>;

pub struct CameraDevice {
    name: String,
    request_tx: Option<mpsc::Sender<FrameReply>>,
    worker: Option<JoinHandle<()>>,
}

impl CameraDevice {
    /// Open the camera at `index` and start streaming
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, String>>();
        let (request_tx, request_rx) = mpsc::channel::<FrameReply>();

        let worker = std::thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || camera_worker(index, ready_tx, request_rx))
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(name)) => {
                info!("Camera opened: {}", name);
                Ok(Self {
                    name,
                    request_tx: Some(request_tx),
                    worker: Some(worker),
                })
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(CaptureError::DeviceUnavailable(e))
            }
            Err(_) => {
                let _ = worker.join();
                Err(CaptureError::DeviceUnavailable(
                    "camera worker exited during startup".to_string(),
                ))
            }
        }
    }
}

fn camera_worker(
    index: u32,
    ready_tx: mpsc::Sender<Result<String, String>>,
    request_rx: mpsc::Receiver<FrameReply>,
) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

    let mut camera = match Camera::new(CameraIndex::Index(index), format) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready_tx.send(Err(e.to_string()));
        return;
    }

    let _ = ready_tx.send(Ok(camera.info().human_name()));

    for reply in request_rx {
        let result = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>())
            .map_err(|e| e.to_string())
            .and_then(|decoded| {
                let (width, height) = (decoded.width(), decoded.height());
                RgbImage::from_raw(width, height, decoded.into_raw())
                    .ok_or_else(|| "frame buffer size mismatch".to_string())
            });
        let _ = reply.send(result);
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Failed to stop camera stream: {}", e);
    }
    debug!("Camera worker exited");
}

impl CaptureDevice for CameraDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        let request_tx = self
            .request_tx
            .as_ref()
            .ok_or_else(|| CaptureError::Frame("camera released".to_string()))?;

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        request_tx
            .send(reply_tx)
            .map_err(|_| CaptureError::Frame("camera worker stopped".to_string()))?;

        reply_rx
            .recv_timeout(GRAB_TIMEOUT)
            .map_err(|e| CaptureError::Frame(e.to_string()))?
            .map_err(CaptureError::Frame)
    }

    fn release(&mut self) {
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Camera worker panicked");
            }
        }
        info!("Camera released: {}", self.name);
    }
}

impl Drop for CameraDevice {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.release();
        }
    }
}
