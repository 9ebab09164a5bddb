//! libdc1394 backend.
//!
//! Thin translation layer: enumeration, mode and frame-rate setup, DMA capture
//! and feature access are all performed by libdc1394. This module only maps
//! types and error codes.

#![allow(unsafe_code)]

use std::mem::MaybeUninit;
use std::rc::Rc;
use std::time::Duration;

use libdc1394_sys::{
    dc1394_camera_enumerate, dc1394_camera_free, dc1394_camera_free_list, dc1394_camera_new_unit,
    dc1394_capture_dequeue, dc1394_capture_enqueue, dc1394_capture_setup, dc1394_capture_stop,
    dc1394_feature_get_boundaries, dc1394_feature_get_mode, dc1394_feature_get_modes,
    dc1394_feature_get_power, dc1394_feature_get_value, dc1394_feature_is_present,
    dc1394_feature_is_readable, dc1394_feature_is_switchable, dc1394_feature_set_mode,
    dc1394_feature_set_power, dc1394_feature_set_value, dc1394_format7_get_color_coding,
    dc1394_free, dc1394_get_color_coding_from_video_mode, dc1394_get_image_size_from_video_mode,
    dc1394_is_video_mode_scalable, dc1394_new, dc1394_video_get_supported_framerates,
    dc1394_video_get_supported_modes, dc1394_video_set_framerate, dc1394_video_set_iso_speed,
    dc1394_video_set_mode, dc1394_video_set_operation_mode, dc1394_video_set_transmission,
    dc1394_t, dc1394bool_t, dc1394camera_list_t, dc1394camera_t, dc1394capture_policy_t,
    dc1394error_t, dc1394feature_mode_t, dc1394feature_t, dc1394framerate_t,
    dc1394operation_mode_t, dc1394speed_t, dc1394switch_t, dc1394video_frame_t,
    dc1394video_mode_t, DC1394_CAPTURE_FLAGS_DEFAULT,
};
use tracing::{debug, info};

use crate::config::OpenOptions;
use crate::negotiate::layout_for;
use crate::traits::{
    CameraBus, CameraDevice, CameraError, ColorCoding, Feature, FeatureMode, Frame,
    FrameMetadata, FrameRate, ModeDescriptor, PixelLayout, Result, Speed,
};

fn check(op: &'static str, err: dc1394error_t::Type) -> Result<()> {
    if err == dc1394error_t::DC1394_SUCCESS {
        Ok(())
    } else {
        #[allow(clippy::unnecessary_cast)]
        let code = err as i32;
        Err(CameraError::Native { op, code })
    }
}

/// Run a native call that reports its result through an out-pointer.
fn out<T, F>(op: &'static str, call: F) -> Result<T>
where
    F: FnOnce(*mut T) -> dc1394error_t::Type,
{
    let mut value = MaybeUninit::<T>::uninit();
    check(op, call(value.as_mut_ptr()))?;
    // SAFETY: libdc1394 initialises the out-value whenever it reports success.
    Ok(unsafe { value.assume_init() })
}

const fn is_true(value: dc1394bool_t::Type) -> bool {
    value == dc1394bool_t::DC1394_TRUE
}

fn native_speed(speed: Speed) -> dc1394speed_t::Type {
    match speed {
        Speed::S100 => dc1394speed_t::DC1394_ISO_SPEED_100,
        Speed::S200 => dc1394speed_t::DC1394_ISO_SPEED_200,
        Speed::S400 => dc1394speed_t::DC1394_ISO_SPEED_400,
        Speed::S800 => dc1394speed_t::DC1394_ISO_SPEED_800,
        Speed::S1600 => dc1394speed_t::DC1394_ISO_SPEED_1600,
        Speed::S3200 => dc1394speed_t::DC1394_ISO_SPEED_3200,
    }
}

fn native_frame_rate(rate: FrameRate) -> dc1394framerate_t::Type {
    match rate {
        FrameRate::F1_875 => dc1394framerate_t::DC1394_FRAMERATE_1_875,
        FrameRate::F3_75 => dc1394framerate_t::DC1394_FRAMERATE_3_75,
        FrameRate::F7_5 => dc1394framerate_t::DC1394_FRAMERATE_7_5,
        FrameRate::F15 => dc1394framerate_t::DC1394_FRAMERATE_15,
        FrameRate::F30 => dc1394framerate_t::DC1394_FRAMERATE_30,
        FrameRate::F60 => dc1394framerate_t::DC1394_FRAMERATE_60,
        FrameRate::F120 => dc1394framerate_t::DC1394_FRAMERATE_120,
        FrameRate::F240 => dc1394framerate_t::DC1394_FRAMERATE_240,
    }
}

fn native_feature(feature: Feature) -> dc1394feature_t::Type {
    match feature {
        Feature::Brightness => dc1394feature_t::DC1394_FEATURE_BRIGHTNESS,
        Feature::Exposure => dc1394feature_t::DC1394_FEATURE_EXPOSURE,
        Feature::Sharpness => dc1394feature_t::DC1394_FEATURE_SHARPNESS,
        Feature::WhiteBalance => dc1394feature_t::DC1394_FEATURE_WHITE_BALANCE,
        Feature::Hue => dc1394feature_t::DC1394_FEATURE_HUE,
        Feature::Saturation => dc1394feature_t::DC1394_FEATURE_SATURATION,
        Feature::Gamma => dc1394feature_t::DC1394_FEATURE_GAMMA,
        Feature::Shutter => dc1394feature_t::DC1394_FEATURE_SHUTTER,
        Feature::Gain => dc1394feature_t::DC1394_FEATURE_GAIN,
        Feature::Iris => dc1394feature_t::DC1394_FEATURE_IRIS,
        Feature::Focus => dc1394feature_t::DC1394_FEATURE_FOCUS,
        Feature::Temperature => dc1394feature_t::DC1394_FEATURE_TEMPERATURE,
        Feature::Trigger => dc1394feature_t::DC1394_FEATURE_TRIGGER,
        Feature::TriggerDelay => dc1394feature_t::DC1394_FEATURE_TRIGGER_DELAY,
        Feature::WhiteShading => dc1394feature_t::DC1394_FEATURE_WHITE_SHADING,
        Feature::FrameRate => dc1394feature_t::DC1394_FEATURE_FRAME_RATE,
        Feature::Zoom => dc1394feature_t::DC1394_FEATURE_ZOOM,
        Feature::Pan => dc1394feature_t::DC1394_FEATURE_PAN,
        Feature::Tilt => dc1394feature_t::DC1394_FEATURE_TILT,
        Feature::OpticalFilter => dc1394feature_t::DC1394_FEATURE_OPTICAL_FILTER,
        Feature::CaptureSize => dc1394feature_t::DC1394_FEATURE_CAPTURE_SIZE,
        Feature::CaptureQuality => dc1394feature_t::DC1394_FEATURE_CAPTURE_QUALITY,
    }
}

fn native_feature_mode(mode: FeatureMode) -> dc1394feature_mode_t::Type {
    match mode {
        FeatureMode::Manual => dc1394feature_mode_t::DC1394_FEATURE_MODE_MANUAL,
        FeatureMode::Auto => dc1394feature_mode_t::DC1394_FEATURE_MODE_AUTO,
        FeatureMode::OnePushAuto => dc1394feature_mode_t::DC1394_FEATURE_MODE_ONE_PUSH_AUTO,
    }
}

fn feature_mode_from_native(mode: dc1394feature_mode_t::Type) -> Result<FeatureMode> {
    match mode {
        dc1394feature_mode_t::DC1394_FEATURE_MODE_MANUAL => Ok(FeatureMode::Manual),
        dc1394feature_mode_t::DC1394_FEATURE_MODE_AUTO => Ok(FeatureMode::Auto),
        dc1394feature_mode_t::DC1394_FEATURE_MODE_ONE_PUSH_AUTO => Ok(FeatureMode::OnePushAuto),
        _ => Err(CameraError::Native {
            op: "dc1394_feature_get_mode",
            code: dc1394error_t::DC1394_INVALID_FEATURE_MODE as i32,
        }),
    }
}

/// Owned `dc1394_t` context.
struct Context {
    handle: *mut dc1394_t,
}

impl Drop for Context {
    fn drop(&mut self) {
        // SAFETY: handle came from dc1394_new and every camera holding the
        // context through an Rc has already been freed.
        unsafe { dc1394_free(self.handle) };
    }
}

/// Owned `dc1394camera_t`, stopped and freed on drop.
struct CameraHandle {
    ptr: *mut dc1394camera_t,
    capturing: bool,
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        // SAFETY: ptr came from dc1394_camera_new_unit and is freed only here.
        unsafe {
            if self.capturing {
                dc1394_video_set_transmission(self.ptr, dc1394switch_t::DC1394_OFF);
                dc1394_capture_stop(self.ptr);
            }
            dc1394_camera_free(self.ptr);
        }
    }
}

/// Camera bus backed by a libdc1394 context.
pub struct Dc1394Bus {
    context: Rc<Context>,
}

impl Dc1394Bus {
    /// (guid, unit) of every camera on the bus.
    fn camera_ids(&self) -> Result<Vec<(u64, i32)>> {
        let handle = self.context.handle;
        let list: *mut dc1394camera_list_t = out("dc1394_camera_enumerate", |list| unsafe {
            dc1394_camera_enumerate(handle, list)
        })?;
        if list.is_null() {
            return Err(CameraError::NoCameraFound);
        }

        // SAFETY: list is non-null and owns `num` ids until freed below.
        let ids = unsafe {
            let list_ref = &*list;
            let ids = if list_ref.num == 0 || list_ref.ids.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(list_ref.ids, list_ref.num as usize)
                    .iter()
                    .map(|id| (id.guid, i32::from(id.unit)))
                    .collect()
            };
            dc1394_camera_free_list(list);
            ids
        };
        Ok(ids)
    }
}

impl CameraBus for Dc1394Bus {
    type Device = Dc1394Camera;

    fn connect() -> Result<Self> {
        // SAFETY: plain constructor, null signals failure.
        let handle = unsafe { dc1394_new() };
        if handle.is_null() {
            return Err(CameraError::BusInit("dc1394_new returned null".to_owned()));
        }
        debug!("created libdc1394 context");
        Ok(Self {
            context: Rc::new(Context { handle }),
        })
    }

    fn camera_count(&self) -> Result<usize> {
        Ok(self.camera_ids()?.len())
    }

    fn open_camera(
        &self,
        options: &OpenOptions,
        select: &mut dyn FnMut(&[ModeDescriptor]) -> Result<usize>,
    ) -> Result<Self::Device> {
        let ids = self.camera_ids()?;
        if ids.is_empty() {
            return Err(CameraError::NoCameraFound);
        }
        let &(guid, unit) = ids
            .get(options.node as usize)
            .ok_or(CameraError::NodeNotFound(options.node))?;

        // SAFETY: context handle is valid for the lifetime of self.
        let ptr = unsafe { dc1394_camera_new_unit(self.context.handle, guid, unit) };
        if ptr.is_null() {
            return Err(CameraError::Native {
                op: "dc1394_camera_new_unit",
                code: dc1394error_t::DC1394_FAILURE as i32,
            });
        }
        let mut camera = CameraHandle {
            ptr,
            capturing: false,
        };
        debug!("opened camera handle {guid:016x} unit {unit}");

        if options.speed.is_1394b() {
            check("dc1394_video_set_operation_mode", unsafe {
                dc1394_video_set_operation_mode(
                    ptr,
                    dc1394operation_mode_t::DC1394_OPERATION_MODE_1394B,
                )
            })?;
        }
        check("dc1394_video_set_iso_speed", unsafe {
            dc1394_video_set_iso_speed(ptr, native_speed(options.speed))
        })?;

        let modes = supported_modes(ptr)?;
        let descriptors: Vec<ModeDescriptor> = modes.iter().map(|&(_, d)| d).collect();
        let index = select(&descriptors)?;
        let &(mode, descriptor) = modes.get(index).ok_or(CameraError::Native {
            op: "dc1394_video_set_mode",
            code: dc1394error_t::DC1394_INVALID_VIDEO_MODE as i32,
        })?;
        let layout = layout_for(descriptor.coding).ok_or(CameraError::Native {
            op: "dc1394_video_set_mode",
            code: dc1394error_t::DC1394_INVALID_COLOR_CODING as i32,
        })?;

        check("dc1394_video_set_mode", unsafe {
            dc1394_video_set_mode(ptr, mode)
        })?;

        // SAFETY: pure lookup on the mode value.
        if !is_true(unsafe { dc1394_is_video_mode_scalable(mode) }) {
            let rate = pick_frame_rate(ptr, mode, options.frame_rate)?;
            check("dc1394_video_set_framerate", unsafe {
                dc1394_video_set_framerate(ptr, native_frame_rate(rate))
            })?;
            debug!(%rate, "set frame rate");
        }

        check("dc1394_capture_setup", unsafe {
            dc1394_capture_setup(ptr, options.dma_buffers, DC1394_CAPTURE_FLAGS_DEFAULT)
        })?;
        camera.capturing = true;
        check("dc1394_video_set_transmission", unsafe {
            dc1394_video_set_transmission(ptr, dc1394switch_t::DC1394_ON)
        })?;

        info!(
            speed = %options.speed,
            mode = index,
            "started firewire capture"
        );

        Ok(Dc1394Camera {
            handle: Some(camera),
            _context: Rc::clone(&self.context),
            layout,
            width: descriptor.width,
            height: descriptor.height,
            frames_read: 0,
        })
    }
}

/// Native modes of a camera paired with their descriptors.
fn supported_modes(
    ptr: *mut dc1394camera_t,
) -> Result<Vec<(dc1394video_mode_t::Type, ModeDescriptor)>> {
    let modes = out("dc1394_video_get_supported_modes", |m| unsafe {
        dc1394_video_get_supported_modes(ptr, m)
    })?;
    let count = (modes.num as usize).min(modes.modes.len());

    modes
        .modes
        .iter()
        .take(count)
        .map(|&mode| {
            let mut width = 0u32;
            let mut height = 0u32;
            check("dc1394_get_image_size_from_video_mode", unsafe {
                dc1394_get_image_size_from_video_mode(ptr, mode, &mut width, &mut height)
            })?;

            let coding = if is_true(unsafe { dc1394_is_video_mode_scalable(mode) }) {
                out("dc1394_format7_get_color_coding", |c| unsafe {
                    dc1394_format7_get_color_coding(ptr, mode, c)
                })?
            } else {
                out("dc1394_get_color_coding_from_video_mode", |c| unsafe {
                    dc1394_get_color_coding_from_video_mode(ptr, mode, c)
                })?
            };

            #[allow(clippy::unnecessary_cast)]
            let coding = ColorCoding(coding as u32);
            Ok((mode, ModeDescriptor::new(coding, width, height)))
        })
        .collect()
}

/// Requested rate if the mode offers it, otherwise the fastest one it offers.
fn pick_frame_rate(
    ptr: *mut dc1394camera_t,
    mode: dc1394video_mode_t::Type,
    requested: Option<FrameRate>,
) -> Result<FrameRate> {
    let rates = out("dc1394_video_get_supported_framerates", |r| unsafe {
        dc1394_video_get_supported_framerates(ptr, mode, r)
    })?;
    let count = (rates.num as usize).min(rates.framerates.len());
    let offered: Vec<FrameRate> = FrameRate::ALL
        .into_iter()
        .filter(|&rate| {
            rates
                .framerates
                .iter()
                .take(count)
                .any(|&r| r == native_frame_rate(rate))
        })
        .collect();

    match requested {
        Some(rate) if offered.contains(&rate) => Ok(rate),
        Some(rate) => Err(CameraError::FrameRateNotSupported(rate)),
        None => offered.last().copied().ok_or(CameraError::Native {
            op: "dc1394_video_get_supported_framerates",
            code: dc1394error_t::DC1394_INVALID_FRAMERATE as i32,
        }),
    }
}

/// Camera opened through libdc1394 and capturing with DMA.
pub struct Dc1394Camera {
    // declared before the context so it is freed first
    handle: Option<CameraHandle>,
    _context: Rc<Context>,
    layout: PixelLayout,
    width: u32,
    height: u32,
    frames_read: u32,
}

impl Dc1394Camera {
    fn ptr(&self) -> Result<*mut dc1394camera_t> {
        self.handle
            .as_ref()
            .map(|h| h.ptr)
            .ok_or(CameraError::Closed)
    }

    fn flag<F>(&self, op: &'static str, call: F) -> Result<bool>
    where
        F: FnOnce(*mut dc1394camera_t, *mut dc1394bool_t::Type) -> dc1394error_t::Type,
    {
        let ptr = self.ptr()?;
        out(op, |b| call(ptr, b)).map(is_true)
    }
}

impl CameraDevice for Dc1394Camera {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn layout(&self) -> PixelLayout {
        self.layout
    }

    fn status(&self) -> bool {
        self.handle.is_some()
    }

    fn read(&mut self) -> Result<Frame> {
        let ptr = self.ptr()?;
        let frame: *mut dc1394video_frame_t = out("dc1394_capture_dequeue", |f| unsafe {
            dc1394_capture_dequeue(ptr, dc1394capture_policy_t::DC1394_CAPTURE_POLICY_WAIT, f)
        })?;
        if frame.is_null() {
            return Err(CameraError::Native {
                op: "dc1394_capture_dequeue",
                code: dc1394error_t::DC1394_CAPTURE_IS_NOT_SET as i32,
            });
        }

        // SAFETY: the dequeued frame stays valid until it is enqueued again.
        let (mut data, timestamp, little_endian) = unsafe {
            let f = &*frame;
            let data = std::slice::from_raw_parts(f.image, f.image_bytes as usize).to_vec();
            (data, f.timestamp, is_true(f.little_endian))
        };
        check("dc1394_capture_enqueue", unsafe {
            dc1394_capture_enqueue(ptr, frame)
        })?;

        if self.layout == PixelLayout::Mono16 && little_endian != cfg!(target_endian = "little") {
            for pair in data.chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }

        let sequence = self.frames_read;
        self.frames_read = self.frames_read.wrapping_add(1);

        Ok(Frame {
            layout: self.layout,
            width: self.width,
            height: self.height,
            data,
            metadata: FrameMetadata {
                sequence,
                timestamp: Duration::from_micros(timestamp),
            },
        })
    }

    fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("closed camera");
        }
    }

    fn feature_read(&self, feature: Feature) -> Result<u32> {
        let ptr = self.ptr()?;
        out("dc1394_feature_get_value", |v| unsafe {
            dc1394_feature_get_value(ptr, native_feature(feature), v)
        })
    }

    fn feature_write(&mut self, feature: Feature, value: u32) -> Result<()> {
        let ptr = self.ptr()?;
        check("dc1394_feature_set_value", unsafe {
            dc1394_feature_set_value(ptr, native_feature(feature), value)
        })
    }

    fn feature_exists(&self, feature: Feature) -> Result<bool> {
        self.flag("dc1394_feature_is_present", |p, b| unsafe {
            dc1394_feature_is_present(p, native_feature(feature), b)
        })
    }

    fn feature_readable(&self, feature: Feature) -> Result<bool> {
        self.flag("dc1394_feature_is_readable", |p, b| unsafe {
            dc1394_feature_is_readable(p, native_feature(feature), b)
        })
    }

    fn feature_switchable(&self, feature: Feature) -> Result<bool> {
        self.flag("dc1394_feature_is_switchable", |p, b| unsafe {
            dc1394_feature_is_switchable(p, native_feature(feature), b)
        })
    }

    fn feature_is_on(&self, feature: Feature) -> Result<bool> {
        let ptr = self.ptr()?;
        let power = out("dc1394_feature_get_power", |s| unsafe {
            dc1394_feature_get_power(ptr, native_feature(feature), s)
        })?;
        Ok(power == dc1394switch_t::DC1394_ON)
    }

    fn feature_set_on(&mut self, feature: Feature, on: bool) -> Result<()> {
        let ptr = self.ptr()?;
        let switch = if on {
            dc1394switch_t::DC1394_ON
        } else {
            dc1394switch_t::DC1394_OFF
        };
        check("dc1394_feature_set_power", unsafe {
            dc1394_feature_set_power(ptr, native_feature(feature), switch)
        })
    }

    fn feature_modes(&self, feature: Feature) -> Result<Vec<FeatureMode>> {
        let ptr = self.ptr()?;
        let modes = out("dc1394_feature_get_modes", |m| unsafe {
            dc1394_feature_get_modes(ptr, native_feature(feature), m)
        })?;
        let count = (modes.num as usize).min(modes.modes.len());
        modes
            .modes
            .iter()
            .take(count)
            .map(|&m| feature_mode_from_native(m))
            .collect()
    }

    fn feature_mode(&self, feature: Feature) -> Result<FeatureMode> {
        let ptr = self.ptr()?;
        let mode = out("dc1394_feature_get_mode", |m| unsafe {
            dc1394_feature_get_mode(ptr, native_feature(feature), m)
        })?;
        feature_mode_from_native(mode)
    }

    fn set_feature_mode(&mut self, feature: Feature, mode: FeatureMode) -> Result<()> {
        let ptr = self.ptr()?;
        check("dc1394_feature_set_mode", unsafe {
            dc1394_feature_set_mode(ptr, native_feature(feature), native_feature_mode(mode))
        })
    }

    fn feature_min(&self, feature: Feature) -> Result<u32> {
        self.feature_bounds(feature).map(|(min, _)| min)
    }

    fn feature_max(&self, feature: Feature) -> Result<u32> {
        self.feature_bounds(feature).map(|(_, max)| max)
    }
}

impl Dc1394Camera {
    fn feature_bounds(&self, feature: Feature) -> Result<(u32, u32)> {
        let ptr = self.ptr()?;
        let mut min = 0u32;
        let mut max = 0u32;
        check("dc1394_feature_get_boundaries", unsafe {
            dc1394_feature_get_boundaries(ptr, native_feature(feature), &mut min, &mut max)
        })?;
        // some cameras report the range reversed
        Ok((min.min(max), min.max(max)))
    }
}
