//! Nodes binnen de scene: transforms, shapes, shading groups en instancers.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::geom::{CurveGeometry, Point3, Quaternion, Transform, Vec3};
use crate::instancing::{DisplayOverrides, InstancerParams};

/// Identifier voor een node binnen de scene.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd, Serialize)]
pub struct NodeId(pub usize);

impl NodeId {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lokale transformatie (translate, rotate, scale) ten opzichte van de ouder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform {
    pub translation: Vec3,
    pub rotation: Quaternion,
    pub scale: Vec3,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quaternion::IDENTITY,
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl LocalTransform {
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn matrix(&self) -> Transform {
        Transform::from_trs(self.translation, self.rotation, self.scale)
    }
}

/// Driehoeksmesh die als referentie-object kan dienen.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshShape {
    pub vertices: Vec<Point3>,
    pub triangles: Vec<[u32; 3]>,
}

impl MeshShape {
    /// Kubus van 1x1x1 rond de oorsprong.
    #[must_use]
    pub fn unit_cube() -> Self {
        let h = 0.5;
        let vertices = vec![
            Point3::new(-h, -h, -h),
            Point3::new(h, -h, -h),
            Point3::new(h, h, -h),
            Point3::new(-h, h, -h),
            Point3::new(-h, -h, h),
            Point3::new(h, -h, h),
            Point3::new(h, h, h),
            Point3::new(-h, h, h),
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        Self {
            vertices,
            triangles,
        }
    }
}

/// Soort node met de bijbehorende payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Transform, eventueel met een shape. Duplicaten delen de shape van het origineel.
    Transform { shape: Option<NodeId> },
    Curve(CurveGeometry),
    Mesh(MeshShape),
    ShadingGroup { members: BTreeSet<NodeId> },
    Instancer(InstancerParams),
}

impl NodeKind {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Transform { .. } => "transform",
            Self::Curve(_) => "curve",
            Self::Mesh(_) => "mesh",
            Self::ShadingGroup { .. } => "shadingGroup",
            Self::Instancer(_) => "instancer",
        }
    }

    #[must_use]
    pub const fn is_shape(&self) -> bool {
        matches!(self, Self::Curve(_) | Self::Mesh(_))
    }
}

/// Node representatie binnen de scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    /// Unieke identifier binnen de scene.
    pub id: NodeId,
    /// Unieke naam.
    pub name: String,
    pub kind: NodeKind,
    /// Ouder in de hiërarchie; `None` voor nodes op wereldniveau.
    pub parent: Option<NodeId>,
    pub transform: LocalTransform,
    /// Display-overrides zoals die door een instancer worden gezet.
    pub overrides: DisplayOverrides,
}

impl SceneNode {
    #[must_use]
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            parent: None,
            transform: LocalTransform::default(),
            overrides: DisplayOverrides::default(),
        }
    }

    /// Shape onder deze node, of de node zelf als het al een shape is.
    #[must_use]
    pub fn shape(&self) -> Option<NodeId> {
        match &self.kind {
            NodeKind::Transform { shape } => *shape,
            kind if kind.is_shape() => Some(self.id),
            _ => None,
        }
    }

    #[must_use]
    pub fn instancer_params(&self) -> Option<&InstancerParams> {
        match &self.kind {
            NodeKind::Instancer(params) => Some(params),
            _ => None,
        }
    }

    pub fn instancer_params_mut(&mut self) -> Option<&mut InstancerParams> {
        match &mut self.kind {
            NodeKind::Instancer(params) => Some(params),
            _ => None,
        }
    }

    #[must_use]
    pub fn curve(&self) -> Option<&CurveGeometry> {
        match &self.kind {
            NodeKind::Curve(geometry) => Some(geometry),
            _ => None,
        }
    }
}
