//! In-memory scene that records authoring calls and serialises to JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scene::{
    Bevel, CurveSpec, FollowPathSpec, HostError, MaterialSpec, ObjectKind, SceneAuthoring,
    SceneObject,
};
use crate::{NtError, Params};

const FOLLOW_PATH_CONSTRAINT: &str = "Follow Path";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GeneratorInfo {
    pub crate_version: String,
    pub params_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

impl GeneratorInfo {
    pub fn for_params(params: &Params) -> Result<Self, NtError> {
        Ok(Self {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            params_hash: params.params_hash_sha256()?,
            generated_at: None,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    FollowPath { name: String, spec: FollowPathSpec },
    Other { name: String },
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::FollowPath { name, .. } | Constraint::Other { name } => name,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PathAnimation {
    /// Driven by the host's own path animation for `constraint` on `object`.
    Automatic { object: String, constraint: String },
    /// `(frame, eval_time)` pairs, sorted by frame.
    Keyframes { keys: Vec<(u32, f64)> },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CurveData {
    pub points: Vec<[f64; 3]>,
    pub material: Option<String>,
    pub bevel: Option<Bevel>,
    pub resolution_u: u32,
    #[serde(default)]
    pub use_path: bool,
    #[serde(default)]
    pub hide_render: bool,
    #[serde(default)]
    pub hide_viewport: bool,
    #[serde(default)]
    pub path_duration: Option<u32>,
    #[serde(default)]
    pub animation: Option<PathAnimation>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DocumentObject {
    pub name: String,
    pub kind: ObjectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<CurveData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorInfo>,
    #[serde(default)]
    pub objects: Vec<DocumentObject>,
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialSpec>,
    /// When false, `animate_path` fails like a host without the operator.
    #[serde(default = "default_true")]
    pub supports_path_animate: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SceneDocument {
    fn default() -> Self {
        Self {
            generator: None,
            objects: Vec::new(),
            active: None,
            materials: BTreeMap::new(),
            supports_path_animate: true,
        }
    }
}

impl SceneDocument {
    pub fn with_objects(objects: impl IntoIterator<Item = SceneObject>) -> Self {
        Self {
            objects: objects
                .into_iter()
                .map(|o| DocumentObject {
                    name: o.name,
                    kind: o.kind,
                    curve: None,
                    constraints: Vec::new(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn object(&self, name: &str) -> Option<&DocumentObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    fn object_mut(
        &mut self,
        name: &str,
        operation: &str,
    ) -> Result<&mut DocumentObject, HostError> {
        self.objects
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| HostError::new(operation, format!("no object named `{name}`")))
    }

    fn curve_mut(&mut self, name: &str, operation: &str) -> Result<&mut CurveData, HostError> {
        self.object_mut(name, operation)?
            .curve
            .as_mut()
            .ok_or_else(|| HostError::new(operation, format!("`{name}` is not a curve")))
    }

    /// `base`, or `base.001`, `base.002`, ... if taken.
    fn unique_object_name(&self, base: &str) -> String {
        unique_name(base, |candidate| self.object(candidate).is_some())
    }
}

fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|i| format!("{base}.{i:03}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

impl SceneAuthoring for SceneDocument {
    fn upsert_material(&mut self, spec: &MaterialSpec) -> Result<(), HostError> {
        self.materials.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn add_poly_curve(&mut self, spec: &CurveSpec) -> Result<String, HostError> {
        if spec.points.is_empty() {
            return Err(HostError::new(
                "add_poly_curve",
                format!("curve `{}` has no points", spec.name),
            ));
        }
        if let Some(material) = spec.material.as_deref() {
            if !self.materials.contains_key(material) {
                return Err(HostError::new(
                    "add_poly_curve",
                    format!("unknown material `{material}`"),
                ));
            }
        }
        let name = self.unique_object_name(&spec.name);
        self.objects.push(DocumentObject {
            name: name.clone(),
            kind: ObjectKind::Curve,
            curve: Some(CurveData {
                points: spec.points.clone(),
                material: spec.material.clone(),
                bevel: spec.bevel,
                resolution_u: spec.resolution_u,
                use_path: false,
                hide_render: false,
                hide_viewport: false,
                path_duration: None,
                animation: None,
            }),
            constraints: Vec::new(),
        });
        Ok(name)
    }

    fn configure_guide(&mut self, curve: &str) -> Result<(), HostError> {
        let data = self.curve_mut(curve, "configure_guide")?;
        data.use_path = true;
        data.hide_render = true;
        data.hide_viewport = true;
        Ok(())
    }

    fn scene_objects(&self) -> Vec<SceneObject> {
        self.objects
            .iter()
            .map(|o| SceneObject {
                name: o.name.clone(),
                kind: o.kind,
            })
            .collect()
    }

    fn active_object(&self) -> Option<String> {
        self.active.clone()
    }

    fn remove_follow_path_constraints(&mut self, object: &str) -> Result<usize, HostError> {
        let obj = self.object_mut(object, "remove_follow_path_constraints")?;
        let before = obj.constraints.len();
        obj.constraints
            .retain(|c| !matches!(c, Constraint::FollowPath { .. }));
        Ok(before - obj.constraints.len())
    }

    fn add_follow_path_constraint(
        &mut self,
        object: &str,
        spec: &FollowPathSpec,
    ) -> Result<String, HostError> {
        const OP: &str = "add_follow_path_constraint";
        if self.object(&spec.target).and_then(|o| o.curve.as_ref()).is_none() {
            return Err(HostError::new(
                OP,
                format!("target `{}` is not a curve", spec.target),
            ));
        }
        let obj = self.object_mut(object, OP)?;
        let name = unique_name(FOLLOW_PATH_CONSTRAINT, |candidate| {
            obj.constraints.iter().any(|c| c.name() == candidate)
        });
        obj.constraints.push(Constraint::FollowPath {
            name: name.clone(),
            spec: spec.clone(),
        });
        Ok(name)
    }

    fn set_path_duration(&mut self, curve: &str, frames: u32) -> Result<(), HostError> {
        self.curve_mut(curve, "set_path_duration")?.path_duration = Some(frames);
        Ok(())
    }

    fn animate_path(&mut self, object: &str, constraint: &str) -> Result<(), HostError> {
        const OP: &str = "animate_path";
        if !self.supports_path_animate {
            return Err(HostError::new(OP, "automatic path animation unavailable"));
        }
        let target = self
            .object(object)
            .and_then(|o| {
                o.constraints.iter().find_map(|c| match c {
                    Constraint::FollowPath { name, spec } if name == constraint => {
                        Some(spec.target.clone())
                    }
                    _ => None,
                })
            })
            .ok_or_else(|| {
                HostError::new(OP, format!("no follow-path `{constraint}` on `{object}`"))
            })?;
        self.curve_mut(&target, OP)?.animation = Some(PathAnimation::Automatic {
            object: object.to_string(),
            constraint: constraint.to_string(),
        });
        Ok(())
    }

    fn keyframe_eval_time(
        &mut self,
        curve: &str,
        frame: u32,
        value: f64,
    ) -> Result<(), HostError> {
        let data = self.curve_mut(curve, "keyframe_eval_time")?;
        if !matches!(data.animation, Some(PathAnimation::Keyframes { .. })) {
            data.animation = Some(PathAnimation::Keyframes { keys: Vec::new() });
        }
        if let Some(PathAnimation::Keyframes { keys }) = data.animation.as_mut() {
            match keys.binary_search_by_key(&frame, |(f, _)| *f) {
                Ok(i) => keys[i].1 = value,
                Err(i) => keys.insert(i, (frame, value)),
            }
        }
        Ok(())
    }
}
