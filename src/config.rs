//! Options for opening a camera.

use crate::traits::{FrameRate, Speed};

/// Number of DMA ring buffers allocated for capture by default.
pub const DEFAULT_DMA_BUFFERS: u32 = 4;

/// Parameters of a camera open call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Index of the camera among those enumerated on the bus.
    pub node: u32,
    /// ISO transfer speed.
    pub speed: Speed,
    /// Requested fixed frame rate; `None` picks the fastest the mode offers.
    pub frame_rate: Option<FrameRate>,
    /// Number of DMA buffers for capture.
    pub dma_buffers: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            node: 0,
            speed: Speed::default(),
            frame_rate: None,
            dma_buffers: DEFAULT_DMA_BUFFERS,
        }
    }
}

impl OpenOptions {
    /// Options for camera `node` with all other settings at their defaults.
    #[must_use]
    pub fn node(node: u32) -> Self {
        Self {
            node,
            ..Self::default()
        }
    }

    /// Set the ISO transfer speed.
    #[must_use]
    pub const fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    /// Request a fixed frame rate.
    #[must_use]
    pub const fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    /// Set the number of DMA buffers (at least one is always used).
    #[must_use]
    pub fn with_dma_buffers(mut self, count: u32) -> Self {
        self.dma_buffers = count.max(1);
        self
    }
}
