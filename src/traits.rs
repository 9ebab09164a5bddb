//! Core traits and types for IIDC camera abstraction.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::config::OpenOptions;

/// Native color coding as reported by libdc1394 (`dc1394color_coding_t`).
///
/// Kept as a raw value so codings this crate does not know about can still be
/// reported back to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorCoding(pub u32);

impl ColorCoding {
    /// 8-bit monochrome.
    pub const MONO8: Self = Self(352);
    /// YUV 4:1:1.
    pub const YUV411: Self = Self(353);
    /// Packed YUV 4:2:2 (UYVY byte order).
    pub const YUV422: Self = Self(354);
    /// YUV 4:4:4.
    pub const YUV444: Self = Self(355);
    /// 24-bit RGB.
    pub const RGB8: Self = Self(356);
    /// 16-bit monochrome.
    pub const MONO16: Self = Self(357);
    /// 48-bit RGB.
    pub const RGB16: Self = Self(358);
    /// Signed 16-bit monochrome.
    pub const MONO16S: Self = Self(359);
    /// Signed 48-bit RGB.
    pub const RGB16S: Self = Self(360);
    /// 8-bit raw Bayer data.
    pub const RAW8: Self = Self(361);
    /// 16-bit raw Bayer data.
    pub const RAW16: Self = Self(362);
}

impl fmt::Display for ColorCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Pixel layouts understood by the host imaging code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    /// 8-bit grey values.
    Mono8,
    /// Packed YUV 4:2:2 in `U Y0 V Y1` order.
    Uyvy,
    /// 8-bit RGB triplets.
    Rgb8,
    /// 16-bit grey values.
    Mono16,
}

impl PixelLayout {
    /// Storage size of one pixel (UYVY averages two bytes per pixel).
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Uyvy | Self::Mono16 => 2,
            Self::Rgb8 => 3,
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mono8 => "MONO8",
            Self::Uyvy => "UYVY",
            Self::Rgb8 => "RGB8",
            Self::Mono16 => "MONO16",
        };
        f.write_str(name)
    }
}

impl FromStr for PixelLayout {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mono8" => Ok(Self::Mono8),
            "uyvy" | "yuv422" => Ok(Self::Uyvy),
            "rgb8" => Ok(Self::Rgb8),
            "mono16" => Ok(Self::Mono16),
            other => Err(CameraError::InvalidOption(format!(
                "unknown pixel layout '{other}' (expected mono8, uyvy, rgb8 or mono16)"
            ))),
        }
    }
}

/// A video mode as reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDescriptor {
    /// Native color coding of the mode.
    pub coding: ColorCoding,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl ModeDescriptor {
    /// Create a new mode descriptor.
    #[must_use]
    pub const fn new(coding: ColorCoding, width: u32, height: u32) -> Self {
        Self {
            coding,
            width,
            height,
        }
    }
}

/// A video mode expressed in host pixel layouts, offered to a mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    /// Pixel layout of the mode.
    pub layout: PixelLayout,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl Candidate {
    /// Create a new candidate.
    #[must_use]
    pub const fn new(layout: PixelLayout, width: u32, height: u32) -> Self {
        Self {
            layout,
            width,
            height,
        }
    }

    /// Number of pixels in one frame.
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}x{}", self.layout, self.width, self.height)
    }
}

/// Firewire ISO transfer speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    /// 100 Mbit/s.
    S100,
    /// 200 Mbit/s.
    S200,
    /// 400 Mbit/s.
    #[default]
    S400,
    /// 800 Mbit/s (1394b).
    S800,
    /// 1600 Mbit/s (1394b).
    S1600,
    /// 3200 Mbit/s (1394b).
    S3200,
}

impl Speed {
    /// Nominal bandwidth in Mbit/s.
    #[must_use]
    pub const fn mbps(self) -> u32 {
        match self {
            Self::S100 => 100,
            Self::S200 => 200,
            Self::S400 => 400,
            Self::S800 => 800,
            Self::S1600 => 1600,
            Self::S3200 => 3200,
        }
    }

    /// Whether the speed requires 1394b operation mode.
    #[must_use]
    pub const fn is_1394b(self) -> bool {
        matches!(self, Self::S800 | Self::S1600 | Self::S3200)
    }
}

impl FromStr for Speed {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "100" => Ok(Self::S100),
            "200" => Ok(Self::S200),
            "400" => Ok(Self::S400),
            "800" => Ok(Self::S800),
            "1600" => Ok(Self::S1600),
            "3200" => Ok(Self::S3200),
            other => Err(CameraError::InvalidOption(format!(
                "unknown ISO speed '{other}' (expected 100, 200, 400, 800, 1600 or 3200)"
            ))),
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Mbit/s", self.mbps())
    }
}

/// Fixed frame rates defined by the IIDC standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameRate {
    /// 1.875 fps.
    F1_875,
    /// 3.75 fps.
    F3_75,
    /// 7.5 fps.
    F7_5,
    /// 15 fps.
    F15,
    /// 30 fps.
    F30,
    /// 60 fps.
    F60,
    /// 120 fps.
    F120,
    /// 240 fps.
    F240,
}

impl FrameRate {
    /// All fixed rates, slowest first.
    pub const ALL: [Self; 8] = [
        Self::F1_875,
        Self::F3_75,
        Self::F7_5,
        Self::F15,
        Self::F30,
        Self::F60,
        Self::F120,
        Self::F240,
    ];

    /// Frames per second.
    #[must_use]
    pub const fn fps(self) -> f64 {
        match self {
            Self::F1_875 => 1.875,
            Self::F3_75 => 3.75,
            Self::F7_5 => 7.5,
            Self::F15 => 15.0,
            Self::F30 => 30.0,
            Self::F60 => 60.0,
            Self::F120 => 120.0,
            Self::F240 => 240.0,
        }
    }
}

impl FromStr for FrameRate {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.875" => Ok(Self::F1_875),
            "3.75" => Ok(Self::F3_75),
            "7.5" => Ok(Self::F7_5),
            "15" => Ok(Self::F15),
            "30" => Ok(Self::F30),
            "60" => Ok(Self::F60),
            "120" => Ok(Self::F120),
            "240" => Ok(Self::F240),
            other => Err(CameraError::InvalidOption(format!(
                "unknown frame rate '{other}' (expected one of 1.875, 3.75, 7.5, 15, 30, 60, 120, 240)"
            ))),
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fps", self.fps())
    }
}

/// Camera features controllable through the IIDC register set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Brightness (black level).
    Brightness,
    /// Auto exposure target.
    Exposure,
    /// Sharpness.
    Sharpness,
    /// White balance.
    WhiteBalance,
    /// Hue.
    Hue,
    /// Saturation.
    Saturation,
    /// Gamma.
    Gamma,
    /// Shutter (integration time).
    Shutter,
    /// Gain.
    Gain,
    /// Iris.
    Iris,
    /// Focus.
    Focus,
    /// Sensor temperature.
    Temperature,
    /// Trigger.
    Trigger,
    /// Trigger delay.
    TriggerDelay,
    /// White shading.
    WhiteShading,
    /// Frame rate.
    FrameRate,
    /// Zoom.
    Zoom,
    /// Pan.
    Pan,
    /// Tilt.
    Tilt,
    /// Optical filter.
    OpticalFilter,
    /// Capture size.
    CaptureSize,
    /// Capture quality.
    CaptureQuality,
}

/// Control mode of a camera feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMode {
    /// Value set by the host.
    Manual,
    /// Value adjusted continuously by the camera.
    Auto,
    /// Camera adjusts once, then holds the value.
    OnePushAuto,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number (DMA buffer id for native cameras).
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
}

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel layout of `data`.
    pub layout: PixelLayout,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw frame data. 16-bit samples are in host byte order.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Number of bytes a complete frame of this layout and size occupies.
    #[must_use]
    pub const fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.bytes_per_pixel()
    }

    /// Get RGB values for a pixel at the specified coordinates.
    ///
    /// Grey layouts are replicated into all three channels; 16-bit samples are
    /// reduced to their high byte. For UYVY, odd x coordinates use the second
    /// luma sample of the pair with the shared U/V values.
    ///
    /// Returns `None` if the coordinates fall outside the frame or the buffer.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;

        match self.layout {
            PixelLayout::Mono8 => {
                let v = *self.data.get(index)?;
                Some((v, v, v))
            }
            PixelLayout::Mono16 => {
                let offset = index * 2;
                let bytes = [*self.data.get(offset)?, *self.data.get(offset + 1)?];
                #[allow(clippy::cast_possible_truncation)]
                let v = (u16::from_ne_bytes(bytes) >> 8) as u8;
                Some((v, v, v))
            }
            PixelLayout::Rgb8 => {
                let offset = index * 3;
                Some((
                    *self.data.get(offset)?,
                    *self.data.get(offset + 1)?,
                    *self.data.get(offset + 2)?,
                ))
            }
            PixelLayout::Uyvy => {
                // [U Y0 V Y1] repeats, each pair of pixels shares U and V
                let pair = (index & !1) * 2;
                let u = *self.data.get(pair)?;
                let v = *self.data.get(pair + 2)?;
                let y_val = if x % 2 == 0 {
                    *self.data.get(pair + 1)?
                } else {
                    *self.data.get(pair + 3)?
                };
                Some(yuv_to_rgb(y_val, u, v))
            }
        }
    }
}

/// Convert YUV values to RGB using ITU-R BT.601.
#[must_use]
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    let clamp = |val: f32| -> u8 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            val.clamp(0.0, 255.0) as u8
        }
    };

    (clamp(r), clamp(g), clamp(b))
}

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// None of the device's video modes maps to a supported pixel layout.
    #[error("Device does not support a known video mode")]
    NoKnownVideoMode,
    /// The selected mode is not among the device's supported candidates.
    #[error("Frame type {0} not supported by camera")]
    FrameTypeNotSupported(Candidate),
    /// The native library could not be initialised.
    #[error("Error initialising DC1394 library: {0}")]
    BusInit(String),
    /// No camera is attached to the bus.
    #[error(
        "Could not find a single digital camera on the firewire bus. Check that the \
         firewire kernel modules are loaded, that you have read/write permission on \
         the firewire device nodes, and that the camera is connected and powered up"
    )]
    NoCameraFound,
    /// The requested camera node does not exist.
    #[error("Camera node {0} not found")]
    NodeNotFound(u32),
    /// The selected video mode does not offer the requested frame rate.
    #[error("Frame rate {0} not supported by the selected video mode")]
    FrameRateNotSupported(FrameRate),
    /// A configuration value could not be parsed.
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    /// The camera was closed before the operation.
    #[error("Camera is closed")]
    Closed,
    /// A native library call failed.
    #[error("{op} failed with DC1394 error code {code}")]
    Native {
        /// Name of the failing native call.
        op: &'static str,
        /// Native error code.
        code: i32,
    },
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Abstraction over a camera bus handle.
pub trait CameraBus {
    /// The camera type returned by `open_camera`.
    type Device: CameraDevice;

    /// Acquire a new bus handle.
    fn connect() -> Result<Self>
    where
        Self: Sized;

    /// Number of cameras currently attached to the bus.
    fn camera_count(&self) -> Result<usize>;

    /// Open camera `options.node`.
    ///
    /// `select` receives every video mode the device reports and returns the
    /// index of the one to activate.
    fn open_camera(
        &self,
        options: &OpenOptions,
        select: &mut dyn FnMut(&[ModeDescriptor]) -> Result<usize>,
    ) -> Result<Self::Device>;
}

/// Abstraction over an opened camera.
pub trait CameraDevice {
    /// Width of captured frames.
    fn width(&self) -> u32;

    /// Height of captured frames.
    fn height(&self) -> u32;

    /// Pixel layout of captured frames.
    fn layout(&self) -> PixelLayout;

    /// Whether the camera is still open.
    fn status(&self) -> bool;

    /// Capture the next frame, blocking until one is available.
    fn read(&mut self) -> Result<Frame>;

    /// Stop transmission and release the camera. Closing twice is a no-op.
    fn close(&mut self);

    /// Current raw value of a feature.
    fn feature_read(&self, feature: Feature) -> Result<u32>;

    /// Set the raw value of a feature.
    fn feature_write(&mut self, feature: Feature, value: u32) -> Result<()>;

    /// Whether the camera implements a feature.
    fn feature_exists(&self, feature: Feature) -> Result<bool>;

    /// Whether a feature's value can be read back.
    fn feature_readable(&self, feature: Feature) -> Result<bool>;

    /// Whether a feature can be switched on and off.
    fn feature_switchable(&self, feature: Feature) -> Result<bool>;

    /// Whether a feature is switched on.
    fn feature_is_on(&self, feature: Feature) -> Result<bool>;

    /// Switch a feature on or off.
    fn feature_set_on(&mut self, feature: Feature, on: bool) -> Result<()>;

    /// Control modes a feature supports.
    fn feature_modes(&self, feature: Feature) -> Result<Vec<FeatureMode>>;

    /// Current control mode of a feature.
    fn feature_mode(&self, feature: Feature) -> Result<FeatureMode>;

    /// Change the control mode of a feature.
    fn set_feature_mode(&mut self, feature: Feature, mode: FeatureMode) -> Result<()>;

    /// Smallest raw value of a feature.
    fn feature_min(&self, feature: Feature) -> Result<u32>;

    /// Largest raw value of a feature.
    fn feature_max(&self, feature: Feature) -> Result<u32>;
}
