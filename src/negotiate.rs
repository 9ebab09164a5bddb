//! Video mode negotiation.
//!
//! A device reports its video modes as native color codings with a
//! resolution. Only four codings map onto pixel layouts the host imaging code
//! understands; the rest are reported and skipped. The remaining candidates go
//! to a [`ModeSelector`], and the chosen candidate is translated back to the
//! position of its mode in the device's list.

use std::cmp::Reverse;

use tracing::{debug, warn};

use crate::traits::{CameraError, Candidate, ColorCoding, ModeDescriptor, PixelLayout, Result};

/// Layouts picked by [`PreferredLayout`], most preferred first.
pub const PREFERENCE: [PixelLayout; 4] = [
    PixelLayout::Rgb8,
    PixelLayout::Uyvy,
    PixelLayout::Mono16,
    PixelLayout::Mono8,
];

/// Pixel layout a native color coding maps to, if any.
#[must_use]
pub const fn layout_for(coding: ColorCoding) -> Option<PixelLayout> {
    match coding {
        ColorCoding::MONO8 => Some(PixelLayout::Mono8),
        ColorCoding::YUV422 => Some(PixelLayout::Uyvy),
        ColorCoding::RGB8 => Some(PixelLayout::Rgb8),
        ColorCoding::MONO16 => Some(PixelLayout::Mono16),
        _ => None,
    }
}

/// Modes of a device that map to a known pixel layout.
///
/// Each candidate remembers the position of its mode in the unfiltered list.
#[derive(Debug, Clone, Default)]
pub struct CandidateList {
    candidates: Vec<Candidate>,
    indices: Vec<usize>,
    unsupported: Vec<ModeDescriptor>,
}

impl CandidateList {
    /// Filter the modes reported by a device, warning about each one whose
    /// color coding has no pixel layout.
    #[must_use]
    pub fn from_modes(modes: &[ModeDescriptor]) -> Self {
        let mut list = Self::default();
        for (index, mode) in modes.iter().enumerate() {
            if let Some(layout) = layout_for(mode.coding) {
                list.candidates
                    .push(Candidate::new(layout, mode.width, mode.height));
                list.indices.push(index);
            } else {
                warn!(
                    "Unsupported video mode {} {}x{}",
                    mode.coding, mode.width, mode.height
                );
                list.unsupported.push(*mode);
            }
        }
        list
    }

    /// Candidates in device order.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Modes that were skipped for lack of a pixel layout.
    #[must_use]
    pub fn unsupported(&self) -> &[ModeDescriptor] {
        &self.unsupported
    }

    /// Position in the device's mode list of the first mode matching
    /// `candidate`.
    #[must_use]
    pub fn index_of(&self, candidate: &Candidate) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c == candidate)
            .and_then(|pos| self.indices.get(pos).copied())
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether no mode of the device is usable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Strategy choosing one candidate from those a device offers.
pub trait ModeSelector {
    /// Pick a candidate. The result must be a member of `candidates`.
    fn select(&mut self, candidates: &[Candidate]) -> Result<Candidate>;
}

impl<F> ModeSelector for F
where
    F: FnMut(&[Candidate]) -> Candidate,
{
    fn select(&mut self, candidates: &[Candidate]) -> Result<Candidate> {
        Ok(self(candidates))
    }
}

/// Default policy: best layout in [`PREFERENCE`] order, then largest frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferredLayout;

impl ModeSelector for PreferredLayout {
    fn select(&mut self, candidates: &[Candidate]) -> Result<Candidate> {
        candidates
            .iter()
            .copied()
            .max_by_key(|c| (Reverse(preference_rank(c.layout)), c.area()))
            .ok_or(CameraError::NoKnownVideoMode)
    }
}

/// Position of `layout` in [`PREFERENCE`]; lower is better.
fn preference_rank(layout: PixelLayout) -> usize {
    PREFERENCE
        .iter()
        .position(|&l| l == layout)
        .unwrap_or(PREFERENCE.len())
}

/// Choose the video mode to activate and return its index in `modes`.
///
/// # Errors
///
/// * `NoKnownVideoMode` if `selector` is [`PreferredLayout`] and no mode maps
///   to a pixel layout.
/// * `FrameTypeNotSupported` if the selector returns a candidate the device
///   does not offer.
pub fn negotiate<S>(modes: &[ModeDescriptor], selector: &mut S) -> Result<usize>
where
    S: ModeSelector + ?Sized,
{
    let list = CandidateList::from_modes(modes);
    debug!(
        modes = modes.len(),
        candidates = list.len(),
        "negotiating video mode"
    );

    let desired = selector.select(list.candidates())?;
    let index = list
        .index_of(&desired)
        .ok_or(CameraError::FrameTypeNotSupported(desired))?;

    debug!(%desired, index, "selected video mode");
    Ok(index)
}
