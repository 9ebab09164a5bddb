//! Bus handle shared by every camera opened through it.
//!
//! The handle is created on the first open and kept for later ones. A handle
//! whose very first open fails is released again, so a failed open never
//! leaves a dangling native context behind.

use tracing::{debug, info};

use crate::config::OpenOptions;
use crate::negotiate::{negotiate, ModeSelector, PreferredLayout};
use crate::traits::{CameraBus, CameraDevice, ModeDescriptor, Result};

/// Lazily created, reused camera bus handle.
pub struct BusCache<B: CameraBus> {
    bus: Option<B>,
    connect: fn() -> Result<B>,
}

impl<B: CameraBus> Default for BusCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: CameraBus> BusCache<B> {
    /// Cache that acquires its handle with [`CameraBus::connect`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(B::connect)
    }

    /// Cache that acquires its handle with `connect`.
    #[must_use]
    pub fn with_connector(connect: fn() -> Result<B>) -> Self {
        Self { bus: None, connect }
    }

    /// Whether a handle is currently cached.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.bus.is_some()
    }

    /// The cached handle, if any.
    #[must_use]
    pub const fn bus(&self) -> Option<&B> {
        self.bus.as_ref()
    }

    /// Drop the cached handle. Returns whether one was cached.
    ///
    /// Cameras that are still open keep whatever native state they need.
    pub fn release(&mut self) -> bool {
        let had_bus = self.bus.take().is_some();
        if had_bus {
            debug!("released bus handle");
        }
        had_bus
    }

    /// Number of cameras on the bus, connecting first if needed.
    pub fn camera_count(&mut self) -> Result<usize> {
        if let Some(bus) = &self.bus {
            return bus.camera_count();
        }
        let bus = (self.connect)()?;
        let count = bus.camera_count()?;
        self.bus = Some(bus);
        Ok(count)
    }

    /// Open a camera, letting `selector` choose its video mode.
    pub fn open<S>(&mut self, options: &OpenOptions, selector: &mut S) -> Result<B::Device>
    where
        S: ModeSelector + ?Sized,
    {
        let mut select = |modes: &[ModeDescriptor]| negotiate(modes, &mut *selector);

        let device = if let Some(bus) = &self.bus {
            bus.open_camera(options, &mut select)?
        } else {
            let bus = (self.connect)()?;
            debug!("created bus handle");
            match bus.open_camera(options, &mut select) {
                Ok(device) => {
                    self.bus = Some(bus);
                    device
                }
                Err(err) => {
                    debug!(%err, "first open failed, releasing bus handle");
                    return Err(err);
                }
            }
        };

        info!(
            node = options.node,
            width = device.width(),
            height = device.height(),
            layout = %device.layout(),
            "opened camera"
        );
        Ok(device)
    }

    /// Open a camera with the [`PreferredLayout`] policy.
    pub fn open_preferred(&mut self, options: &OpenOptions) -> Result<B::Device> {
        self.open(options, &mut PreferredLayout)
    }
}
