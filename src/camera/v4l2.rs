use crate::camera::FrameSource;
use crate::common::{AttendanceError, Result};
use crate::common::config::CameraConfig;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::fs;

const STREAM_BUFFERS: u32 = 4;

/// A `/dev/video*` node and what it can do.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub can_capture: bool,
    pub formats: Vec<String>,
}

pub struct Camera {
    device: Device,
    config: CameraConfig,
    index: u32,
}

pub struct CameraSession<'a> {
    stream: v4l::io::mmap::Stream<'a>,
    format: v4l::Format,
}

impl Camera {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let index = match config.device_index {
            Some(index) => index,
            None => Self::first_capture_device()?,
        };
        Self::new_with_device(index, config.clone())
    }

    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(index) = file_name
                .to_str()
                .and_then(|name| name.strip_prefix("video"))
                .and_then(|idx| idx.parse::<u32>().ok())
            else {
                continue;
            };

            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };

            let formats = device
                .enum_formats()
                .unwrap_or_default()
                .iter()
                .filter_map(|fmt| fmt.fourcc.str().ok().map(str::to_string))
                .collect();

            cameras.push(CameraInfo {
                index,
                name: caps.card.clone(),
                can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
                formats,
            });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }

    /// Lowest-numbered device that supports video capture, else device 0.
    fn first_capture_device() -> Result<u32> {
        let cameras = Self::list_all_cameras()?;
        match cameras.iter().find(|c| c.can_capture) {
            Some(camera) => {
                tracing::info!("Selected camera /dev/video{} ({})", camera.index, camera.name);
                Ok(camera.index)
            }
            None => {
                tracing::warn!("No capture device detected, falling back to /dev/video0");
                Ok(0)
            }
        }
    }

    pub fn new_with_device(index: u32, config: CameraConfig) -> Result<Self> {
        tracing::info!("Opening camera device {}", index);

        let device = Device::new(index as usize)
            .map_err(|e| AttendanceError::Camera(format!("Failed to open camera {}: {}", index, e)))?;

        let caps = device.query_caps()
            .map_err(|e| AttendanceError::Camera(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} may not support standard video capture", index);
        }

        let mut fmt = device.format()
            .map_err(|e| AttendanceError::Camera(format!("Failed to get format: {}", e)))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = FourCC::new(b"MJPG");

        // The device may not support the exact request; keep whatever it settles on.
        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let final_fmt = device.format()
            .map_err(|e| AttendanceError::Camera(format!("Failed to get final format: {}", e)))?;
        tracing::info!(
            "Camera format: {}x{} {}",
            final_fmt.width,
            final_fmt.height,
            final_fmt.fourcc.str().unwrap_or("????")
        );
        if final_fmt.width != config.width || final_fmt.height != config.height {
            tracing::warn!(
                "Camera resolution {}x{} differs from requested {}x{}",
                final_fmt.width, final_fmt.height, config.width, config.height
            );
        }

        Ok(Self { device, config, index })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Starts streaming and discards the configured warm-up frames.
    pub fn start_session(&self) -> Result<CameraSession<'_>> {
        let format = self.device.format()
            .map_err(|e| AttendanceError::Camera(format!("Failed to get format: {}", e)))?;

        let mut stream = v4l::io::mmap::Stream::with_buffers(&self.device, Type::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| AttendanceError::Camera(format!("Failed to create stream: {}", e)))?;

        for i in 0..self.config.warmup_frames {
            stream.next()
                .map_err(|e| AttendanceError::Camera(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(std::time::Duration::from_millis(self.config.warmup_delay_ms));
        }
        tracing::debug!("Camera ready after {} warmup frames", self.config.warmup_frames);

        Ok(CameraSession { stream, format })
    }
}

impl<'a> FrameSource for CameraSession<'a> {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        let (buf, meta) = self.stream.next()
            .map_err(|e| AttendanceError::Camera(format!("Failed to capture: {}", e)))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used > 0 { &buf[..used] } else { buf };

        decode_frame(data, &self.format.fourcc.repr, self.format.width, self.format.height)
    }
}

/// Decodes one raw V4L2 buffer.
pub fn decode_frame(data: &[u8], fourcc: &[u8; 4], width: u32, height: u32) -> Result<DynamicImage> {
    match fourcc {
        b"MJPG" | b"JPEG" => image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| AttendanceError::Camera(format!("Failed to decode MJPG frame: {}", e))),
        b"GREY" => {
            let expected = (width * height) as usize;
            let pixels = data.get(..expected)
                .ok_or_else(|| AttendanceError::Camera("Short GREY frame".into()))?;
            GrayImage::from_raw(width, height, pixels.to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| AttendanceError::Camera("Failed to create grayscale image buffer".into()))
        }
        b"YUYV" => yuyv_to_rgb(data, width, height).map(DynamicImage::ImageRgb8),
        other => Err(AttendanceError::Camera(format!(
            "Unsupported pixel format {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected || width % 2 != 0 {
        return Err(AttendanceError::Camera("Short or misaligned YUYV frame".into()));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| AttendanceError::Camera("Failed to create RGB image buffer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_grey_frames() {
        let data: Vec<u8> = (0..12).collect();
        let img = decode_frame(&data, b"GREY", 4, 3).unwrap();
        assert_eq!(img.to_luma8().get_pixel(3, 2)[0], 11);
    }

    #[test]
    fn decodes_yuyv_neutral_chroma_as_gray() {
        // Y=100 for both pixels, U=V=128
        let data = [100, 128, 100, 128, 100, 128, 100, 128];
        let img = decode_frame(&data, b"YUYV", 2, 2).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(1, 1).0, [100, 100, 100]);
    }

    #[test]
    fn decodes_jpeg_frames() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([10, 200, 30])));
        let mut jpeg = std::io::Cursor::new(Vec::new());
        src.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();

        let img = decode_frame(jpeg.get_ref(), b"MJPG", 8, 8).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));
    }

    #[test]
    fn rejects_short_and_unknown_frames() {
        assert!(decode_frame(&[0; 5], b"GREY", 4, 3).is_err());
        assert!(decode_frame(&[0; 5], b"YUYV", 2, 2).is_err());
        assert!(decode_frame(&[0; 16], b"RGB3", 2, 2).is_err());
    }
}
