use crate::decode::{DecodeError, MjpegDecoder, PixelDecoder, YuyvDecoder};
use common::retry_with_backoff;
use std::io;
use std::time::Duration;
use thiserror::Error;
use v4l::{
    FourCC,
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
    prelude::*,
    video::Capture,
    video::capture::Parameters,
};

const BUFFER_COUNT: u32 = 4;

/// Frames to discard per capture so auto-exposure settles and no stale
/// buffer is served.
const WARMUP_FRAME_COUNT: usize = 3;

const FOURCC_YUYV: FourCC = FourCC { repr: *b"YUYV" };
const FOURCC_MJPG: FourCC = FourCC { repr: *b"MJPG" };

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("camera access denied")]
    PermissionDenied,

    #[error("no camera device found")]
    DeviceNotFound,

    #[error("camera is already in use by another application")]
    DeviceBusy,

    #[error("camera does not support the requested configuration: {0}")]
    UnsupportedConstraints(String),

    #[error("camera I/O error: {0}")]
    Io(io::Error),
}

impl MediaError {
    /// A busy device or transient I/O fault may clear on its own; denied
    /// permission, a missing device, and constraint failures are terminal
    /// for the session and must surface immediately.
    fn is_transient(&self) -> bool {
        matches!(self, MediaError::DeviceBusy | MediaError::Io(_))
    }

    fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::PermissionDenied => MediaError::PermissionDenied,
            io::ErrorKind::NotFound => MediaError::DeviceNotFound,
            _ if e.raw_os_error() == Some(libc::EBUSY) => MediaError::DeviceBusy,
            _ => MediaError::Io(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera not ready")]
    NotReady,

    #[error("failed to read frame from stream: {0}")]
    Stream(io::Error),

    #[error("frame decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("JPEG encode failed: {0}")]
    Encode(turbojpeg::Error),
}

/// An encoded still image, produced fresh per capture.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Source of still frames for the capture loop.
pub trait FrameSource {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Requested camera configuration. The driver may negotiate different
/// values; the actual ones are logged at acquisition time.
#[derive(Debug, Clone)]
pub struct CameraConstraints {
    pub device_index: u32,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            device_index: 0,
            ideal_width: 640,
            ideal_height: 480,
            frame_rate: 30,
        }
    }
}

fn find_usable_camera() -> Option<u32> {
    v4l::context::enum_devices()
        .into_iter()
        .find(|dev| {
            Device::with_path(dev.path())
                .and_then(|d| d.query_caps())
                .map(|caps| {
                    caps.capabilities
                        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                })
                .unwrap_or(false)
        })
        .map(|dev| dev.index() as u32)
}

fn open_device(index: u32) -> Result<Device, MediaError> {
    match Device::new(index as usize) {
        Ok(dev) if dev.query_caps().is_ok() => return Ok(dev),
        Ok(_) => {}
        // Denied access is terminal for the session; do not scan alternatives.
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(MediaError::PermissionDenied);
        }
        Err(_) => {}
    }

    tracing::debug!("Camera index {} busy or missing, scanning alternatives...", index);

    let best_idx = find_usable_camera().ok_or(MediaError::DeviceNotFound)?;
    Device::new(best_idx as usize).map_err(MediaError::from_io)
}

/// Select pixel format: prefer YUYV (cheaper decode), fall back to MJPEG.
fn select_format(device: &Device) -> Result<FourCC, MediaError> {
    let formats = device.enum_formats().map_err(MediaError::from_io)?;

    if formats.iter().any(|f| f.fourcc == FOURCC_YUYV) {
        return Ok(FOURCC_YUYV);
    }
    if formats.iter().any(|f| f.fourcc == FOURCC_MJPG) {
        return Ok(FOURCC_MJPG);
    }

    Err(MediaError::UnsupportedConstraints(format!(
        "camera supports neither YUYV nor MJPEG - available: {:?}",
        formats.iter().map(|f| f.fourcc).collect::<Vec<_>>()
    )))
}

fn build_decoder(fourcc: FourCC) -> Result<Box<dyn PixelDecoder>, MediaError> {
    match fourcc {
        f if f == FOURCC_MJPG => {
            let decoder = MjpegDecoder::new().map_err(|e| {
                MediaError::UnsupportedConstraints(format!("MJPEG decoder unavailable: {e}"))
            })?;
            Ok(Box::new(decoder))
        }
        _ => Ok(Box::new(YuyvDecoder::new())),
    }
}

/// The bound camera stream: device plus negotiated format. At most one
/// exists per `Camera` instance.
struct BoundStream {
    device: Device,
    width: u32,
    height: u32,
    decoder: Box<dyn PixelDecoder>,
}

/// Owns the camera lifecycle: acquire, capture still frames, release.
pub struct Camera {
    bound: Option<BoundStream>,
    jpeg_quality: i32,
}

impl Camera {
    /// `jpeg_quality` is on a 0-1 scale, matching the capture surface the
    /// kiosk originally ran on.
    pub fn new(jpeg_quality: f32) -> Self {
        Self {
            bound: None,
            jpeg_quality: quality_scale(jpeg_quality),
        }
    }

    /// Open the device, negotiate a format close to `constraints`, and
    /// verify streaming by pulling the first frame. Acquisition errors are
    /// terminal for the session beyond the bounded open retry here.
    pub fn acquire(&mut self, constraints: &CameraConstraints) -> Result<(), MediaError> {
        self.release();

        let device = retry_with_backoff(
            || open_device(constraints.device_index),
            MediaError::is_transient,
            5,
            Duration::from_millis(200),
            Duration::from_secs(2),
            "Camera open",
        )?;

        let caps = device.query_caps().map_err(MediaError::from_io)?;
        tracing::info!("Camera opened: {} ({})", caps.card, caps.driver);

        let fourcc = select_format(&device)?;

        let mut format = device.format().map_err(MediaError::from_io)?;
        format.fourcc = fourcc;
        format.width = constraints.ideal_width;
        format.height = constraints.ideal_height;
        let format = device.set_format(&format).map_err(MediaError::from_io)?;

        if format.fourcc != fourcc {
            return Err(MediaError::UnsupportedConstraints(format!(
                "driver refused {:?}, negotiated {:?}",
                fourcc, format.fourcc
            )));
        }

        if let Err(e) = device.set_params(&Parameters::with_fps(constraints.frame_rate)) {
            tracing::debug!("Frame rate {} not applied: {}", constraints.frame_rate, e);
        }

        tracing::info!(
            "Capture format: {}x{} {:?}",
            format.width,
            format.height,
            format.fourcc
        );

        // Ready once the stream delivers its first frame.
        {
            let mut stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(MediaError::from_io)?;
            stream.next().map_err(MediaError::from_io)?;
        }
        tracing::info!("Camera stream verified, first frame received");

        self.bound = Some(BoundStream {
            device,
            width: format.width,
            height: format.height,
            decoder: build_decoder(format.fourcc)?,
        });

        Ok(())
    }

    /// Snapshot the current camera content as a JPEG frame.
    pub fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let bound = self.bound.as_mut().ok_or(CaptureError::NotReady)?;

        let mut stream = Stream::with_buffers(&bound.device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(CaptureError::Stream)?;

        for _ in 0..WARMUP_FRAME_COUNT {
            let _ = stream.next();
        }

        let (raw, _meta) = stream.next().map_err(CaptureError::Stream)?;
        let rgb = bound.decoder.decode(raw, bound.width, bound.height)?;
        let data = encode_jpeg(rgb, bound.width, bound.height, self.jpeg_quality)
            .map_err(CaptureError::Encode)?;

        Ok(Frame {
            data,
            mime: "image/jpeg",
            width: bound.width,
            height: bound.height,
        })
    }

    /// Stop streaming and close the device. Idempotent; safe to call when
    /// no stream was ever acquired.
    pub fn release(&mut self) {
        if self.bound.take().is_some() {
            tracing::info!("Camera released");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.bound.is_some()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.release();
    }
}

impl FrameSource for Camera {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        Camera::capture_frame(self)
    }
}

fn quality_scale(quality: f32) -> i32 {
    (quality * 100.0).round().clamp(1.0, 100.0) as i32
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: i32) -> Result<Vec<u8>, turbojpeg::Error> {
    let image = turbojpeg::Image {
        pixels: rgb,
        width: width as usize,
        pitch: width as usize * 3,
        height: height as usize,
        format: turbojpeg::PixelFormat::RGB,
    };

    let jpeg = turbojpeg::compress(image, quality, turbojpeg::Subsamp::Sub2x2)?;
    Ok(jpeg.to_vec())
}
