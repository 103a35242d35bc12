//! Camera stream acquisition and still-frame capture.
//!
//! [`CaptureAdapter::open`] asks for an exact rear-facing camera first and
//! silently retries with an unconstrained request; only when both fail does
//! it surface [`GuideError::CameraUnavailable`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageBuffer, Rgb, RgbImage};
use tracing::{debug, info, warn};

use wayfarer_core::error::{GuideError, Result};

/// JPEG quality for captured frames (0-100).
const JPEG_QUALITY: u8 = 92;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear-facing.
    Environment,
    User,
}

/// Video constraints for a stream request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing_mode: Option<FacingMode>,
    /// The facing mode must match exactly, not just be preferred.
    pub exact: bool,
}

impl VideoConstraints {
    /// Any camera.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn exact(facing_mode: FacingMode) -> Self {
        Self {
            facing_mode: Some(facing_mode),
            exact: true,
        }
    }
}

/// One RGB8 video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A live video stream from a camera device.
pub trait MediaStream: Send + Sync {
    /// Native resolution (width, height).
    fn resolution(&self) -> (u32, u32);

    /// The frame currently being displayed, if the stream is live.
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Stop every underlying track. Calling this again is a no-op.
    fn stop_tracks(&self);
}

/// A source of camera streams.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: &VideoConstraints,
    ) -> anyhow::Result<Arc<dyn MediaStream>>;
}

/// An open stream owned by the session.
pub struct StreamHandle {
    stream: Arc<dyn MediaStream>,
    closed: AtomicBool,
}

impl StreamHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct CaptureAdapter {
    device: Arc<dyn CameraDevice>,
    timeout: Duration,
}

impl CaptureAdapter {
    pub fn new(device: Arc<dyn CameraDevice>, timeout: Duration) -> Self {
        Self { device, timeout }
    }

    async fn request(&self, constraints: VideoConstraints) -> anyhow::Result<Arc<dyn MediaStream>> {
        match tokio::time::timeout(self.timeout, self.device.get_user_media(&constraints)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("camera request timed out after {:?}", self.timeout),
        }
    }

    /// Open a camera stream, preferring the rear-facing device.
    pub async fn open(&self, prefer_rear: bool) -> Result<StreamHandle> {
        if prefer_rear {
            match self.request(VideoConstraints::exact(FacingMode::Environment)).await {
                Ok(stream) => {
                    info!("Rear camera opened");
                    return Ok(StreamHandle {
                        stream,
                        closed: AtomicBool::new(false),
                    });
                }
                Err(e) => debug!(%e, "Rear camera unavailable, trying any camera"),
            }
        }

        match self.request(VideoConstraints::any()).await {
            Ok(stream) => {
                info!("Camera opened");
                Ok(StreamHandle {
                    stream,
                    closed: AtomicBool::new(false),
                })
            }
            Err(e) if is_permission_denied(&e) => {
                warn!(%e, "Camera access refused");
                Err(GuideError::PermissionDenied(e.to_string()))
            }
            Err(e) => {
                warn!(%e, "No camera could be opened");
                Err(GuideError::CameraUnavailable(e.to_string()))
            }
        }
    }

    /// Grab the current frame at native resolution and JPEG-encode it.
    ///
    /// Encoding runs on the blocking pool.
    pub async fn capture(&self, handle: &StreamHandle) -> Result<Vec<u8>> {
        if handle.is_closed() {
            return Err(GuideError::NoFrame);
        }
        let frame = handle.stream.current_frame().ok_or(GuideError::NoFrame)?;
        let (width, height) = handle.stream.resolution();
        tokio::task::spawn_blocking(move || encode_frame(&frame, width, height))
            .await
            .map_err(|e| GuideError::Other(anyhow::anyhow!("Frame encoder task failed: {e}")))?
    }

    /// Stop all tracks of the stream. Safe to call on a closed stream.
    pub fn close(handle: &StreamHandle) {
        if !handle.closed.swap(true, Ordering::SeqCst) {
            handle.stream.stop_tracks();
            debug!("Camera stream closed");
        }
    }
}

/// Whether the device refused access rather than being missing.
fn is_permission_denied(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        let io = cause.downcast_ref::<std::io::Error>().or_else(|| {
            match cause.downcast_ref::<image::ImageError>() {
                Some(image::ImageError::IoError(io)) => Some(io),
                _ => None,
            }
        });
        io.is_some_and(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
    })
}

/// Draw the frame onto a raster sized to the stream and encode it as JPEG.
pub fn encode_frame(frame: &VideoFrame, width: u32, height: u32) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(GuideError::NoFrame);
    }

    let source: RgbImage =
        ImageBuffer::from_raw(frame.width, frame.height, frame.pixels.clone())
            .ok_or(GuideError::NoFrame)?;

    let mut canvas: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([0, 0, 0]));
    image::imageops::replace(&mut canvas, &source, 0, 0);

    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&canvas)
        .map_err(|e| GuideError::Other(anyhow::anyhow!("Failed to encode JPEG: {e}")))?;
    Ok(jpeg)
}

/// A camera whose only picture is an image file.
///
/// It has no facing direction, so exact facing requests are unsatisfiable.
pub struct ImageFileCamera {
    path: PathBuf,
}

impl ImageFileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CameraDevice for ImageFileCamera {
    async fn get_user_media(
        &self,
        constraints: &VideoConstraints,
    ) -> anyhow::Result<Arc<dyn MediaStream>> {
        if constraints.exact && constraints.facing_mode.is_some() {
            anyhow::bail!("no camera satisfies facing mode {:?}", constraints.facing_mode);
        }
        let path = self.path.clone();
        let image = tokio::task::spawn_blocking(move || image::open(&path)).await??;
        Ok(Arc::new(StillStream::new(image.to_rgb8())))
    }
}

/// A stream that keeps showing the same frame until stopped.
pub struct StillStream {
    frame: RgbImage,
    live: AtomicBool,
}

impl StillStream {
    pub fn new(frame: RgbImage) -> Self {
        Self {
            frame,
            live: AtomicBool::new(true),
        }
    }
}

impl MediaStream for StillStream {
    fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        if !self.live.load(Ordering::SeqCst) {
            return None;
        }
        Some(VideoFrame {
            width: self.frame.width(),
            height: self.frame.height(),
            pixels: self.frame.as_raw().clone(),
        })
    }

    fn stop_tracks(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}
