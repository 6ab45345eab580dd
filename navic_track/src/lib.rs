//! NavIC-style trajectory generation, jamming segment classification and scene
//! authoring.
//!
//! The pipeline is: [`Params`] are validated, a noisy circular [`Trajectory`] is
//! generated from an injected random source, downsampled into a [`Track`],
//! partitioned into five [`Segment`]s by [`classify`], and finally handed to a
//! [`SceneAuthoring`] host by [`author_scene`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod document;
pub mod scene;
pub mod segments;
pub mod trajectory;

pub use document::{
    Constraint, CurveData, DocumentObject, GeneratorInfo, PathAnimation, SceneDocument,
};
pub use scene::{
    author_scene, pick_proxy, AnimationMode, AuthoringReport, Axis, Bevel, CurveSpec,
    FollowPathSpec, HostError, MaterialSpec, ObjectKind, SceneAuthoring, SceneObject,
    GUIDE_CURVE_NAME,
};
pub use segments::{
    classify, first_index_at_or_after, JamState, Rgba, Segment, SegmentColors,
    SegmentEmission, SegmentThresholds, TrackPlan,
};
pub use trajectory::{generate_trajectory, Sample, Track, Trajectory};

/// Upper bound on `floor(total_time * fs)`; five `f64` columns of this length is ~2 GB.
pub const MAX_SAMPLES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum NtError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("insufficient data for segment classification")]
    InsufficientData,
    #[error("no eligible proxy object found (preferred name `{0}`)")]
    ProxyNotFound(String),
    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    /// Samples per second of the dense trajectory.
    pub fs_trajectory: f64,
    /// Seconds for one full revolution.
    pub total_time: f64,
    pub radius: f64,
    /// Nominal jamming window `(t1, t2)`. Kept independent of `thresholds`.
    pub jam_window: (f64, f64),
    pub noise_std: f64,
    pub bevel_depth: f64,
    pub bevel_resolution: u32,
    pub emission_strength: f32,
    /// Frames taken by the proxy to traverse the guide curve.
    pub path_duration: u32,
    pub drone_name_preference: String,
    pub thresholds: SegmentThresholds,
    pub colors: SegmentColors,
    /// Overrides the default `floor(fs / 2)` downsampling stride.
    pub downsample_stride: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            fs_trajectory: 100.0,
            total_time: 60.0,
            radius: 50.0,
            jam_window: (20.0, 40.0),
            noise_std: 1.2,
            bevel_depth: 0.08,
            bevel_resolution: 2,
            emission_strength: 4.0,
            path_duration: 600,
            drone_name_preference: "Drone".to_string(),
            thresholds: SegmentThresholds::default(),
            colors: SegmentColors::default(),
            downsample_stride: None,
            seed: None,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), NtError> {
        positive("fs_trajectory", self.fs_trajectory)?;
        positive("total_time", self.total_time)?;
        positive("radius", self.radius)?;
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(NtError::InvalidParameter(format!(
                "noise_std must be finite and >= 0 (got {})",
                self.noise_std
            )));
        }
        if !self.bevel_depth.is_finite() || self.bevel_depth < 0.0 {
            return Err(NtError::InvalidParameter(format!(
                "bevel_depth must be finite and >= 0 (got {})",
                self.bevel_depth
            )));
        }
        if self.path_duration == 0 {
            return Err(NtError::InvalidParameter(
                "path_duration must be at least one frame".into(),
            ));
        }
        let product = self.total_time * self.fs_trajectory;
        if self.sample_count() == 0 {
            return Err(NtError::InvalidParameter(format!(
                "total_time * fs_trajectory = {product} yields no samples"
            )));
        }
        if !product.is_finite() || product.floor() > MAX_SAMPLES as f64 {
            return Err(NtError::InvalidParameter(format!(
                "total_time * fs_trajectory = {product} exceeds {MAX_SAMPLES} samples"
            )));
        }
        let (t1, t2) = self.jam_window;
        if !t1.is_finite() || !t2.is_finite() || t2 < t1 {
            return Err(NtError::InvalidParameter(format!(
                "jam_window must be finite with t1 <= t2 (got {:?})",
                self.jam_window
            )));
        }
        self.stride()?;
        self.thresholds.validate()?;
        self.colors.validate()
    }

    /// `floor(total_time * fs)`.
    pub fn sample_count(&self) -> usize {
        let n = (self.total_time * self.fs_trajectory).floor();
        if n.is_finite() && n > 0.0 {
            n as usize
        } else {
            0
        }
    }

    /// Downsampling stride: the explicit override, or `floor(fs / 2)` clamped to 1.
    pub fn stride(&self) -> Result<usize, NtError> {
        match self.downsample_stride {
            Some(0) => Err(NtError::InvalidParameter(
                "downsample_stride must be >= 1".into(),
            )),
            Some(stride) => Ok(stride),
            None => Ok(((self.fs_trajectory / 2.0).floor() as usize).max(1)),
        }
    }

    /// True when the outer segment thresholds disagree with `jam_window`.
    pub fn jam_window_mismatch(&self) -> bool {
        let (t1, t2) = self.jam_window;
        (self.thresholds.ramp_up_start - t1).abs() > f64::EPSILON
            || (self.thresholds.ramp_down_end - t2).abs() > f64::EPSILON
    }

    /// Seeded generator when `seed` is set, entropy otherwise.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn params_hash_sha256(&self) -> Result<String, NtError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| NtError::InvalidParameter(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }
}

fn positive(name: &str, value: f64) -> Result<(), NtError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(NtError::InvalidParameter(format!(
            "{name} must be finite and > 0 (got {value})"
        )))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Generate, downsample and classify in one go.
pub fn build_plan<R: Rng + ?Sized>(params: &Params, rng: &mut R) -> Result<TrackPlan, NtError> {
    params.validate()?;
    let trajectory = generate_trajectory(params, rng)?;
    let track = trajectory.downsample(params.stride()?)?;
    let segments = classify(&track.times, &params.thresholds, &params.colors)?;
    Ok(TrackPlan { track, segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = Params::default();
        params.validate().unwrap();
        assert_eq!(params.sample_count(), 6000);
        assert_eq!(params.stride().unwrap(), 50);
        assert!(!params.jam_window_mismatch());
    }

    #[test]
    fn rejects_non_positive_inputs() {
        for params in [
            Params { fs_trajectory: 0.0, ..Params::default() },
            Params { total_time: -1.0, ..Params::default() },
            Params { radius: f64::NAN, ..Params::default() },
            Params { noise_std: -0.1, ..Params::default() },
            Params { path_duration: 0, ..Params::default() },
            Params { downsample_stride: Some(0), ..Params::default() },
        ] {
            assert!(matches!(params.validate(), Err(NtError::InvalidParameter(_))));
        }
    }

    #[test]
    fn rejects_runs_without_samples() {
        let params = Params {
            fs_trajectory: 1.0,
            total_time: 0.5,
            ..Params::default()
        };
        assert_eq!(params.sample_count(), 0);
        assert!(matches!(params.validate(), Err(NtError::InvalidParameter(_))));
    }

    #[test]
    fn rejects_unallocatable_sample_counts() {
        let params = Params {
            fs_trajectory: 1e20,
            ..Params::default()
        };
        assert!(matches!(params.validate(), Err(NtError::InvalidParameter(_))));
        assert!(matches!(
            build_plan(&params, &mut params.rng()),
            Err(NtError::InvalidParameter(_))
        ));
        let at_cap = Params {
            fs_trajectory: MAX_SAMPLES as f64,
            total_time: 1.0,
            ..Params::default()
        };
        assert!(at_cap.validate().is_ok());
    }

    #[test]
    fn rejects_bad_jam_window_and_colors() {
        for jam_window in [(40.0, 20.0), (f64::NAN, 40.0), (20.0, f64::INFINITY)] {
            let params = Params {
                jam_window,
                ..Params::default()
            };
            assert!(matches!(params.validate(), Err(NtError::InvalidParameter(_))));
        }
        let mut params = Params::default();
        params.colors.ramp_up = Rgba::new(1.5, 0.0, 0.0, 1.0);
        assert!(matches!(params.validate(), Err(NtError::InvalidParameter(_))));
        params.colors.ramp_up = Rgba::new(0.5, f32::NAN, 0.0, 1.0);
        assert!(matches!(params.validate(), Err(NtError::InvalidParameter(_))));
    }

    #[test]
    fn stride_clamps_for_slow_sampling() {
        let params = Params {
            fs_trajectory: 1.5,
            ..Params::default()
        };
        assert_eq!(params.stride().unwrap(), 1);
        let params = Params {
            downsample_stride: Some(7),
            ..Params::default()
        };
        assert_eq!(params.stride().unwrap(), 7);
    }

    #[test]
    fn jam_window_mismatch_flags_divergent_inputs() {
        let mut params = Params::default();
        params.jam_window = (18.0, 40.0);
        assert!(params.jam_window_mismatch());
        params.jam_window = (20.0, 42.0);
        assert!(params.jam_window_mismatch());
    }

    #[test]
    fn params_hash_tracks_content() {
        let a = Params::default();
        let b = Params {
            radius: 40.0,
            ..Params::default()
        };
        let hash = a.params_hash_sha256().unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, Params::default().params_hash_sha256().unwrap());
        assert_ne!(hash, b.params_hash_sha256().unwrap());
    }

    #[test]
    fn params_load_from_partial_json() {
        let params: Params = serde_json::from_str(r#"{"radius": 12.5, "seed": 9}"#).unwrap();
        assert_eq!(params.radius, 12.5);
        assert_eq!(params.seed, Some(9));
        assert_eq!(params.fs_trajectory, 100.0);
        assert_eq!(params.thresholds, SegmentThresholds::default());
    }

    #[test]
    fn build_plan_is_reproducible_with_seed() {
        let params = Params {
            seed: Some(3),
            ..Params::default()
        };
        let a = build_plan(&params, &mut params.rng()).unwrap();
        let b = build_plan(&params, &mut params.rng()).unwrap();
        assert_eq!(a.track.x, b.track.x);
        assert_eq!(a.track.y, b.track.y);
        assert_eq!(a.segments, b.segments);
    }
}
