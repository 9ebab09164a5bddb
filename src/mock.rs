//! Mock bus and camera for testing without hardware.

use std::cell::Cell;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::OpenOptions;
use crate::negotiate::layout_for;
use crate::traits::{
    CameraBus, CameraDevice, CameraError, ColorCoding, Feature, FeatureMode, Frame,
    FrameMetadata, ModeDescriptor, PixelLayout, Result,
};

thread_local! {
    static CONNECTED: Cell<u32> = const { Cell::new(0) };
    static RELEASED: Cell<u32> = const { Cell::new(0) };
}

/// Number of mock bus handles created on this thread.
pub fn connected() -> u32 {
    CONNECTED.with(Cell::get)
}

/// Number of mock bus handles dropped on this thread.
pub fn released() -> u32 {
    RELEASED.with(Cell::get)
}

/// Modes reported by the default mock camera.
pub const DEFAULT_MODES: [ModeDescriptor; 4] = [
    ModeDescriptor::new(ColorCoding::MONO8, 640, 480),
    ModeDescriptor::new(ColorCoding::YUV411, 640, 480),
    ModeDescriptor::new(ColorCoding::YUV422, 640, 480),
    ModeDescriptor::new(ColorCoding::RGB8, 320, 240),
];

/// Mock bus handle with a fixed set of cameras.
#[derive(Debug)]
pub struct MockBus {
    id: u32,
    cameras: u32,
    modes: Vec<ModeDescriptor>,
}

impl MockBus {
    /// Create a bus with one camera reporting `modes`.
    #[must_use]
    pub fn with_modes(modes: &[ModeDescriptor]) -> Self {
        let id = CONNECTED.with(|c| {
            c.set(c.get() + 1);
            c.get()
        });
        Self {
            id,
            cameras: 1,
            modes: modes.to_vec(),
        }
    }

    /// Set the number of cameras on the bus.
    #[must_use]
    pub const fn with_cameras(mut self, cameras: u32) -> Self {
        self.cameras = cameras;
        self
    }

    /// Identity of this handle; unique per thread.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for MockBus {
    fn drop(&mut self) {
        RELEASED.with(|c| c.set(c.get() + 1));
    }
}

impl CameraBus for MockBus {
    type Device = MockCamera;

    fn connect() -> Result<Self> {
        Ok(Self::with_modes(&DEFAULT_MODES))
    }

    fn camera_count(&self) -> Result<usize> {
        Ok(self.cameras as usize)
    }

    fn open_camera(
        &self,
        options: &OpenOptions,
        select: &mut dyn FnMut(&[ModeDescriptor]) -> Result<usize>,
    ) -> Result<Self::Device> {
        if self.cameras == 0 {
            return Err(CameraError::NoCameraFound);
        }
        if options.node >= self.cameras {
            return Err(CameraError::NodeNotFound(options.node));
        }

        let index = select(&self.modes)?;
        let mode = self.modes.get(index).copied().ok_or(CameraError::Native {
            op: "dc1394_video_set_mode",
            code: -1,
        })?;
        let layout = layout_for(mode.coding).ok_or(CameraError::Native {
            op: "dc1394_video_set_mode",
            code: -1,
        })?;

        Ok(MockCamera::new(self.id, index, layout, mode.width, mode.height))
    }
}

/// Mock camera producing frames filled with the frame counter.
#[derive(Debug)]
pub struct MockCamera {
    bus_id: u32,
    mode_index: usize,
    layout: PixelLayout,
    width: u32,
    height: u32,
    open: bool,
    frame_count: u32,
    features: HashMap<Feature, MockFeature>,
}

#[derive(Debug, Clone)]
struct MockFeature {
    value: u32,
    on: bool,
    mode: FeatureMode,
    min: u32,
    max: u32,
}

impl MockCamera {
    fn new(bus_id: u32, mode_index: usize, layout: PixelLayout, width: u32, height: u32) -> Self {
        let mut features = HashMap::new();
        features.insert(
            Feature::Brightness,
            MockFeature {
                value: 128,
                on: true,
                mode: FeatureMode::Manual,
                min: 0,
                max: 255,
            },
        );
        features.insert(
            Feature::Shutter,
            MockFeature {
                value: 500,
                on: true,
                mode: FeatureMode::Auto,
                min: 1,
                max: 4095,
            },
        );
        Self {
            bus_id,
            mode_index,
            layout,
            width,
            height,
            open: true,
            frame_count: 0,
            features,
        }
    }

    /// Id of the bus handle this camera was opened through.
    #[must_use]
    pub const fn bus_id(&self) -> u32 {
        self.bus_id
    }

    /// Index of the activated mode in the device's mode list.
    #[must_use]
    pub const fn mode_index(&self) -> usize {
        self.mode_index
    }

    fn feature(&self, feature: Feature) -> Result<&MockFeature> {
        if !self.open {
            return Err(CameraError::Closed);
        }
        self.features.get(&feature).ok_or(CameraError::Native {
            op: "dc1394_feature_get",
            code: -3,
        })
    }

    fn feature_mut(&mut self, feature: Feature) -> Result<&mut MockFeature> {
        if !self.open {
            return Err(CameraError::Closed);
        }
        self.features.get_mut(&feature).ok_or(CameraError::Native {
            op: "dc1394_feature_set",
            code: -3,
        })
    }
}

impl CameraDevice for MockCamera {
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
        self.open
    }

    fn read(&mut self) -> Result<Frame> {
        if !self.open {
            return Err(CameraError::Closed);
        }
        let seq = self.frame_count;
        self.frame_count += 1;

        let len = self.width as usize * self.height as usize * self.layout.bytes_per_pixel();
        #[allow(clippy::cast_possible_truncation)]
        let fill = seq as u8;

        Ok(Frame {
            layout: self.layout,
            width: self.width,
            height: self.height,
            data: vec![fill; len],
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
            },
        })
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn feature_read(&self, feature: Feature) -> Result<u32> {
        Ok(self.feature(feature)?.value)
    }

    fn feature_write(&mut self, feature: Feature, value: u32) -> Result<()> {
        let f = self.feature_mut(feature)?;
        f.value = value.clamp(f.min, f.max);
        Ok(())
    }

    fn feature_exists(&self, feature: Feature) -> Result<bool> {
        Ok(self.features.contains_key(&feature))
    }

    fn feature_readable(&self, feature: Feature) -> Result<bool> {
        self.feature_exists(feature)
    }

    fn feature_switchable(&self, feature: Feature) -> Result<bool> {
        self.feature_exists(feature)
    }

    fn feature_is_on(&self, feature: Feature) -> Result<bool> {
        Ok(self.feature(feature)?.on)
    }

    fn feature_set_on(&mut self, feature: Feature, on: bool) -> Result<()> {
        self.feature_mut(feature)?.on = on;
        Ok(())
    }

    fn feature_modes(&self, feature: Feature) -> Result<Vec<FeatureMode>> {
        self.feature(feature)?;
        Ok(vec![FeatureMode::Manual, FeatureMode::Auto])
    }

    fn feature_mode(&self, feature: Feature) -> Result<FeatureMode> {
        Ok(self.feature(feature)?.mode)
    }

    fn set_feature_mode(&mut self, feature: Feature, mode: FeatureMode) -> Result<()> {
        self.feature_mut(feature)?.mode = mode;
        Ok(())
    }

    fn feature_min(&self, feature: Feature) -> Result<u32> {
        Ok(self.feature(feature)?.min)
    }

    fn feature_max(&self, feature: Feature) -> Result<u32> {
        Ok(self.feature(feature)?.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_bus_counts_connections() {
        let before = connected();
        let bus = MockBus::connect().expect("connect failed");
        assert_eq!(connected(), before + 1);
        assert_eq!(bus.id(), connected());

        let released_before = released();
        drop(bus);
        assert_eq!(released(), released_before + 1);
    }

    #[test]
    fn test_mock_open_uses_selected_index() {
        let bus = MockBus::connect().expect("connect failed");
        let camera = bus
            .open_camera(&OpenOptions::default(), &mut |_: &[ModeDescriptor]| -> Result<usize> { Ok(2) })
            .expect("open failed");
        assert_eq!(camera.mode_index(), 2);
        assert_eq!(camera.layout(), PixelLayout::Uyvy);
        assert_eq!((camera.width(), camera.height()), (640, 480));
    }

    #[test]
    fn test_mock_node_not_found() {
        let bus = MockBus::connect().expect("connect failed").with_cameras(2);
        let result = bus.open_camera(&OpenOptions::node(2), &mut |_: &[ModeDescriptor]| -> Result<usize> { Ok(0) });
        assert!(matches!(result, Err(CameraError::NodeNotFound(2))));
    }

    #[test]
    fn test_mock_stream_capture() {
        let bus = MockBus::connect().expect("connect failed");
        let mut camera = bus
            .open_camera(&OpenOptions::default(), &mut |_: &[ModeDescriptor]| -> Result<usize> { Ok(3) })
            .expect("open failed");

        let frame1 = camera.read().expect("read failed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.data.len(), frame1.expected_len());

        let frame2 = camera.read().expect("read failed");
        assert_eq!(frame2.metadata.sequence, 1);
        assert_eq!(frame2.pixel_at(0, 0), Some((1, 1, 1)));
    }
}
