//! Scene-authoring boundary.
//!
//! The core never touches a host scene directly. It drives any
//! [`SceneAuthoring`] implementation: a 3D application bridge, the in-memory
//! [`crate::SceneDocument`], or a test double.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::segments::{JamState, Rgba, TrackPlan};
use crate::{NtError, Params};

pub const GUIDE_CURVE_NAME: &str = "NavIC_Path_FOLLOW";

#[derive(Error, Debug, Clone, PartialEq)]
#[error("host operation `{operation}` failed: {reason}")]
pub struct HostError {
    pub operation: String,
    pub reason: String,
}

impl HostError {
    pub fn new(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Mesh,
    Empty,
    Armature,
    Curve,
    Camera,
    Light,
    Other,
}

impl ObjectKind {
    /// Kinds that may be driven along the guide.
    pub fn can_follow_path(self) -> bool {
        matches!(self, ObjectKind::Mesh | ObjectKind::Empty | ObjectKind::Armature)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MaterialSpec {
    pub name: String,
    pub color: Rgba,
    pub strength: f32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Bevel {
    pub depth: f64,
    pub resolution: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CurveSpec {
    pub name: String,
    pub points: Vec<[f64; 3]>,
    pub material: Option<String>,
    pub bevel: Option<Bevel>,
    pub resolution_u: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FollowPathSpec {
    pub target: String,
    pub use_fixed_location: bool,
    pub forward_axis: Axis,
    pub up_axis: Axis,
}

pub trait SceneAuthoring {
    /// Create the named material, or replace its definition if it exists.
    fn upsert_material(&mut self, spec: &MaterialSpec) -> Result<(), HostError>;

    /// Create a poly curve object. Returns the name the host actually used.
    fn add_poly_curve(&mut self, spec: &CurveSpec) -> Result<String, HostError>;

    /// Enable path evaluation on `curve` and hide it from render and viewport.
    fn configure_guide(&mut self, curve: &str) -> Result<(), HostError>;

    fn scene_objects(&self) -> Vec<SceneObject>;

    fn active_object(&self) -> Option<String>;

    /// Returns how many follow-path constraints were removed.
    fn remove_follow_path_constraints(&mut self, object: &str) -> Result<usize, HostError>;

    /// Returns the constraint name.
    fn add_follow_path_constraint(
        &mut self,
        object: &str,
        spec: &FollowPathSpec,
    ) -> Result<String, HostError>;

    fn set_path_duration(&mut self, curve: &str, frames: u32) -> Result<(), HostError>;

    /// Host-native path animation. Allowed to fail; callers fall back to
    /// [`SceneAuthoring::keyframe_eval_time`].
    fn animate_path(&mut self, object: &str, constraint: &str) -> Result<(), HostError>;

    fn keyframe_eval_time(
        &mut self,
        curve: &str,
        frame: u32,
        value: f64,
    ) -> Result<(), HostError>;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnimationMode {
    Automatic,
    ManualKeyframes,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthoringReport {
    pub guide_curve: String,
    pub segment_curves: Vec<String>,
    pub materials: Vec<String>,
    pub proxy: Option<String>,
    pub removed_constraints: usize,
    pub animation: Option<AnimationMode>,
}

/// Preferred name if eligible, then the active object if eligible, then the
/// first eligible object in scene order.
pub fn pick_proxy(
    objects: &[SceneObject],
    active: Option<&str>,
    preference: &str,
) -> Result<SceneObject, NtError> {
    let eligible_named = |name: &str| {
        objects
            .iter()
            .find(|o| o.name == name && o.kind.can_follow_path())
    };
    eligible_named(preference)
        .or_else(|| active.and_then(eligible_named))
        .or_else(|| objects.iter().find(|o| o.kind.can_follow_path()))
        .cloned()
        .ok_or_else(|| NtError::ProxyNotFound(preference.to_string()))
}

/// Build the guide, materials and segment curves, then bind a proxy to the guide.
///
/// A missing proxy is logged and skipped. A failing `animate_path` falls back to
/// two `eval_time` keyframes. Every other host failure aborts.
pub fn author_scene<S: SceneAuthoring + ?Sized>(
    scene: &mut S,
    plan: &TrackPlan,
    params: &Params,
) -> Result<AuthoringReport, NtError> {
    params.validate()?;
    let mut report = AuthoringReport::default();

    let guide = scene.add_poly_curve(&CurveSpec {
        name: GUIDE_CURVE_NAME.to_string(),
        points: plan.guide_points(),
        material: None,
        bevel: None,
        resolution_u: 1,
    })?;
    scene.configure_guide(&guide)?;
    debug!("Guide curve {} with {} points", guide, plan.track.len());
    report.guide_curve = guide.clone();

    let mut seen = BTreeSet::new();
    for state in JamState::ORDER {
        let name = state.material_name();
        if !seen.insert(name) {
            continue;
        }
        scene.upsert_material(&MaterialSpec {
            name: name.to_string(),
            color: params.colors.color_for(state),
            strength: params.emission_strength,
        })?;
        report.materials.push(name.to_string());
    }

    let bevel = (params.bevel_depth > 0.0).then(|| Bevel {
        depth: params.bevel_depth,
        resolution: params.bevel_resolution,
    });
    for emission in plan.emissions() {
        let name = scene.add_poly_curve(&CurveSpec {
            name: emission.state.curve_name(),
            points: emission.points,
            material: Some(emission.state.material_name().to_string()),
            bevel,
            resolution_u: 1,
        })?;
        report.segment_curves.push(name);
    }

    let objects = scene.scene_objects();
    let active = scene.active_object();
    match pick_proxy(&objects, active.as_deref(), &params.drone_name_preference) {
        Ok(proxy) => {
            attach_proxy(scene, &proxy.name, &guide, params, &mut report)?;
            info!(
                "Drone {} attached. Duration: {} frames",
                proxy.name, params.path_duration
            );
        }
        Err(NtError::ProxyNotFound(preferred)) => {
            warn!(
                "Drone object not found. Name an object '{}' or make it active before running.",
                preferred
            );
        }
        Err(err) => return Err(err),
    }

    info!(
        "Coloured NavIC path created: {} segment curves ({})",
        report.segment_curves.len(),
        report.segment_curves.join(" -> ")
    );
    Ok(report)
}

fn attach_proxy<S: SceneAuthoring + ?Sized>(
    scene: &mut S,
    proxy: &str,
    guide: &str,
    params: &Params,
    report: &mut AuthoringReport,
) -> Result<(), NtError> {
    report.removed_constraints = scene.remove_follow_path_constraints(proxy)?;
    let constraint = scene.add_follow_path_constraint(
        proxy,
        &FollowPathSpec {
            target: guide.to_string(),
            use_fixed_location: true,
            forward_axis: Axis::Y,
            up_axis: Axis::Z,
        },
    )?;
    scene.set_path_duration(guide, params.path_duration)?;

    let mode = match scene.animate_path(proxy, &constraint) {
        Ok(()) => AnimationMode::Automatic,
        Err(err) => {
            debug!("Automatic path animation unavailable ({}); keyframing eval_time", err);
            scene.keyframe_eval_time(guide, 1, 0.0)?;
            scene.keyframe_eval_time(
                guide,
                params.path_duration,
                f64::from(params.path_duration),
            )?;
            AnimationMode::ManualKeyframes
        }
    };
    report.proxy = Some(proxy.to_string());
    report.animation = Some(mode);
    Ok(())
}
