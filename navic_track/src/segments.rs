//! Jamming-state segment classification over a downsampled track.
//!
//! The track is cut at four time thresholds into five contiguous ranges that
//! always appear in the same order: non-jammed, ramp-up, full jam, ramp-down,
//! non-jammed. Ranges with fewer than two points still take part in coverage
//! but are not emitted as drawable segments.

use serde::{Deserialize, Serialize};

use crate::trajectory::Track;
use crate::NtError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JamState {
    NonJamA,
    RampUp,
    FullJam,
    RampDown,
    NonJamB,
}

impl JamState {
    pub const ORDER: [JamState; 5] = [
        JamState::NonJamA,
        JamState::RampUp,
        JamState::FullJam,
        JamState::RampDown,
        JamState::NonJamB,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            JamState::NonJamA => "NonJam_A",
            JamState::RampUp => "RampUp",
            JamState::FullJam => "FullJam",
            JamState::RampDown => "RampDown",
            JamState::NonJamB => "NonJam_B",
        }
    }

    /// Both non-jammed stretches share one material.
    pub fn material_name(&self) -> &'static str {
        match self {
            JamState::NonJamA | JamState::NonJamB => "NonJammed_MAT",
            JamState::RampUp => "RampUp_MAT",
            JamState::FullJam => "FullJam_MAT",
            JamState::RampDown => "RampDown_MAT",
        }
    }

    pub fn curve_name(&self) -> String {
        format!("Seg_{}", self.label())
    }
}

/// Linear RGBA, each channel in `0..=1`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Rgba(pub [f32; 4]);

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Rgba([r, g, b, a])
    }

    /// 8-bit RGB, alpha dropped.
    pub fn to_rgb8(&self) -> (u8, u8, u8) {
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        (to_u8(self.0[0]), to_u8(self.0[1]), to_u8(self.0[2]))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentThresholds {
    pub ramp_up_start: f64,
    pub ramp_up_end: f64,
    pub full_jam_end: f64,
    pub ramp_down_end: f64,
}

impl Default for SegmentThresholds {
    fn default() -> Self {
        Self {
            ramp_up_start: 20.0,
            ramp_up_end: 24.0,
            full_jam_end: 36.0,
            ramp_down_end: 40.0,
        }
    }
}

impl SegmentThresholds {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.ramp_up_start,
            self.ramp_up_end,
            self.full_jam_end,
            self.ramp_down_end,
        ]
    }

    pub fn validate(&self) -> Result<(), NtError> {
        let values = self.as_array();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(NtError::InvalidParameter(format!(
                "segment thresholds must be finite (got {values:?})"
            )));
        }
        if values.windows(2).any(|w| w[1] < w[0]) {
            return Err(NtError::InvalidParameter(format!(
                "segment thresholds must be non-decreasing (got {values:?})"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentColors {
    pub non_jam: Rgba,
    pub ramp_up: Rgba,
    pub full_jam: Rgba,
    pub ramp_down: Rgba,
}

impl Default for SegmentColors {
    fn default() -> Self {
        Self {
            non_jam: Rgba::new(0.0, 0.6, 0.0, 1.0),
            ramp_up: Rgba::new(1.0, 0.75, 0.0, 1.0),
            full_jam: Rgba::new(1.0, 0.0, 0.0, 1.0),
            ramp_down: Rgba::new(1.0, 0.4, 0.2, 1.0),
        }
    }
}

impl SegmentColors {
    pub fn validate(&self) -> Result<(), NtError> {
        for (name, color) in [
            ("non_jam", self.non_jam),
            ("ramp_up", self.ramp_up),
            ("full_jam", self.full_jam),
            ("ramp_down", self.ramp_down),
        ] {
            if color.0.iter().any(|c| !(0.0..=1.0).contains(c)) {
                return Err(NtError::InvalidParameter(format!(
                    "colors.{name} channels must lie in 0..=1 (got {:?})",
                    color.0
                )));
            }
        }
        Ok(())
    }

    pub fn color_for(&self, state: JamState) -> Rgba {
        match state {
            JamState::NonJamA | JamState::NonJamB => self.non_jam,
            JamState::RampUp => self.ramp_up,
            JamState::FullJam => self.full_jam,
            JamState::RampDown => self.ramp_down,
        }
    }
}

/// Half-open index range `[start, end)` into the track.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub state: JamState,
    pub start: usize,
    pub end: usize,
    pub color: Rgba,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A single point cannot form a line.
    pub fn is_renderable(&self) -> bool {
        self.len() >= 2
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}

/// First index whose time is `>= threshold`; the last index when none is.
/// `None` only for an empty slice. `times` must be non-decreasing.
pub fn first_index_at_or_after(times: &[f64], threshold: f64) -> Option<usize> {
    if times.is_empty() {
        return None;
    }
    let idx = times.partition_point(|&t| t < threshold);
    Some(idx.min(times.len() - 1))
}

pub fn classify(
    times: &[f64],
    thresholds: &SegmentThresholds,
    colors: &SegmentColors,
) -> Result<Vec<Segment>, NtError> {
    thresholds.validate()?;
    let len = times.len();
    let mut bounds = [0usize; 6];
    bounds[5] = len;
    for (slot, threshold) in bounds[1..5].iter_mut().zip(thresholds.as_array()) {
        *slot = first_index_at_or_after(times, threshold).ok_or(NtError::InsufficientData)?;
    }

    Ok(JamState::ORDER
        .iter()
        .enumerate()
        .map(|(i, &state)| Segment {
            state,
            start: bounds[i],
            end: bounds[i + 1],
            color: colors.color_for(state),
        })
        .collect())
}

/// Drawable slice of the track for one segment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SegmentEmission {
    pub state: JamState,
    pub color: Rgba,
    pub points: Vec<[f64; 3]>,
}

/// Downsampled track plus its full classification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackPlan {
    pub track: Track,
    pub segments: Vec<Segment>,
}

impl TrackPlan {
    /// Every track point, used for the follow path.
    pub fn guide_points(&self) -> Vec<[f64; 3]> {
        self.track.points_3d(0, self.track.len())
    }

    /// Renderable segments in temporal order.
    pub fn emissions(&self) -> Vec<SegmentEmission> {
        self.segments
            .iter()
            .filter(|seg| seg.is_renderable())
            .map(|seg| SegmentEmission {
                state: seg.state,
                color: seg.color,
                points: self.track.points_3d(seg.start, seg.end),
            })
            .collect()
    }

    pub fn state_at(&self, index: usize) -> Option<JamState> {
        self.segments
            .iter()
            .find(|seg| seg.contains(index))
            .map(|seg| seg.state)
    }
}
