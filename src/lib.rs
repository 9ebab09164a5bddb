//! dc1394-capture: IIDC firewire camera access through libdc1394
//!
//! This library opens firewire cameras through a shared bus handle and
//! negotiates which video mode to activate, mapping native color codings onto
//! the pixel layouts the host imaging code understands. Frame capture and
//! feature control are forwarded to libdc1394 (enable the `native` feature).

pub mod bus;
pub mod config;
pub mod negotiate;
pub mod traits;

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub mod mock;

pub use bus::BusCache;
pub use config::OpenOptions;
pub use negotiate::{negotiate, CandidateList, ModeSelector, PreferredLayout};
pub use traits::{
    CameraBus, CameraDevice, CameraError, Candidate, ColorCoding, Feature, FeatureMode, Frame,
    FrameMetadata, FrameRate, ModeDescriptor, PixelLayout, Speed,
};

#[cfg(feature = "native")]
pub use native::{Dc1394Bus, Dc1394Camera};
