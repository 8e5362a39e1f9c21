//! XML-formaat voor scenes met instancers.
//!
//! Elke node wordt één `<node>`-element; de instance-lijst van een instancer
//! staat als gewone `<connection>`-elementen in het bestand, in fysieke
//! volgorde. Getallenlijsten worden als spatiegescheiden attributen bewaard.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use quick_xml::de::from_str;
use quick_xml::se::to_string_with_root;
use serde::{Deserialize, Serialize};

use super::{PersistError, PersistResult};
use crate::geom::{CubicBezier3, CurveGeometry, Line3, NurbsCurve3, Point3, Polyline3, Quaternion, Vec3};
use crate::instancing::{DisplayOverrides, DisplayType, InstancerParams, InstancingMode};
use crate::scene::{
    Connection, LocalTransform, MeshShape, NodeId, NodeKind, PlugRef, Scene, SceneNode,
};

/// Huidige versie van het bestandsformaat.
pub const FORMAT_VERSION: u32 = 1;

/// Schrijf een scene naar een XML-string.
pub fn write_scene(scene: &Scene) -> PersistResult<String> {
    let document = SceneDocument {
        version: FORMAT_VERSION,
        nodes: NodeList {
            nodes: scene.nodes().iter().map(NodeDoc::from_node).collect(),
        },
        connections: ConnectionList {
            connections: scene
                .connections()
                .iter()
                .map(|conn| ConnectionDoc {
                    from: conn.from.to_string(),
                    to: conn.to.to_string(),
                })
                .collect(),
        },
    };
    log::debug!(
        "scene schrijven: {} nodes, {} verbindingen",
        document.nodes.nodes.len(),
        document.connections.connections.len()
    );
    Ok(to_string_with_root("scene", &document)?)
}

/// Lees een scene uit een XML-string.
pub fn read_scene(input: &str) -> PersistResult<Scene> {
    let document: SceneDocument = from_str(input)?;
    if document.version > FORMAT_VERSION {
        return Err(PersistError::Version(document.version));
    }
    log::debug!("scene lezen: {} nodes", document.nodes.nodes.len());

    let mut scene = Scene::new();
    for node in document.nodes.nodes {
        scene.insert_node(node.into_node()?)?;
    }
    for conn in document.connections.connections {
        let from: PlugRef = conn.from.parse().map_err(PersistError::Invalid)?;
        let to: PlugRef = conn.to.parse().map_err(PersistError::Invalid)?;
        scene.restore_connection(Connection::new(from, to))?;
    }
    scene.validate()?;
    Ok(scene)
}

#[derive(Debug, Serialize, Deserialize)]
struct SceneDocument {
    #[serde(rename = "@version", default = "default_version")]
    version: u32,
    #[serde(default)]
    nodes: NodeList,
    #[serde(default)]
    connections: ConnectionList,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeList {
    #[serde(default, rename = "node")]
    nodes: Vec<NodeDoc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConnectionList {
    #[serde(default, rename = "connection")]
    connections: Vec<ConnectionDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectionDoc {
    #[serde(rename = "@from")]
    from: String,
    #[serde(rename = "@to")]
    to: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeDoc {
    #[serde(rename = "@id")]
    id: usize,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@kind")]
    kind: String,
    #[serde(rename = "@parent", default, skip_serializing_if = "Option::is_none")]
    parent: Option<usize>,
    #[serde(rename = "@shape", default, skip_serializing_if = "Option::is_none")]
    shape: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transform: Option<TransformDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display: Option<DisplayDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    curve: Option<CurveDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mesh: Option<MeshDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    members: Option<MembersDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instancer: Option<InstancerDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransformDoc {
    #[serde(rename = "@translate")]
    translate: String,
    #[serde(rename = "@rotate")]
    rotate: String,
    #[serde(rename = "@scale")]
    scale: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DisplayDoc {
    #[serde(rename = "@enabled")]
    enabled: bool,
    #[serde(rename = "@type")]
    display_type: String,
    #[serde(rename = "@bbox")]
    bounding_box: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CurveDoc {
    #[serde(rename = "@type")]
    curve_type: String,
    #[serde(rename = "@points")]
    points: String,
    #[serde(rename = "@degree", default, skip_serializing_if = "Option::is_none")]
    degree: Option<usize>,
    #[serde(rename = "@knots", default, skip_serializing_if = "Option::is_none")]
    knots: Option<String>,
    #[serde(rename = "@weights", default, skip_serializing_if = "Option::is_none")]
    weights: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MeshDoc {
    #[serde(rename = "@vertices")]
    vertices: String,
    #[serde(rename = "@triangles")]
    triangles: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MembersDoc {
    #[serde(rename = "@ids")]
    ids: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstancerDoc {
    #[serde(rename = "@mode")]
    mode: String,
    #[serde(rename = "@count")]
    count: u32,
    #[serde(rename = "@spacing")]
    spacing: f64,
    #[serde(rename = "@maxByLength")]
    max_by_length: u32,
    #[serde(rename = "@display")]
    display_type: String,
    #[serde(rename = "@bbox")]
    bounding_box: bool,
}

impl NodeDoc {
    fn from_node(node: &SceneNode) -> Self {
        let mut doc = Self {
            id: node.id.0,
            name: node.name.clone(),
            kind: node.kind.type_name().to_owned(),
            parent: node.parent.map(|parent| parent.0),
            shape: None,
            transform: (node.transform != LocalTransform::default())
                .then(|| TransformDoc::from_local(&node.transform)),
            display: (node.overrides != DisplayOverrides::default())
                .then(|| DisplayDoc::from_overrides(node.overrides)),
            curve: None,
            mesh: None,
            members: None,
            instancer: None,
        };

        match &node.kind {
            NodeKind::Transform { shape } => doc.shape = shape.map(|shape| shape.0),
            NodeKind::Curve(geometry) => doc.curve = Some(CurveDoc::from_geometry(geometry)),
            NodeKind::Mesh(mesh) => {
                doc.mesh = Some(MeshDoc {
                    vertices: join_points(&mesh.vertices),
                    triangles: join_numbers(mesh.triangles.iter().flatten().map(|&i| f64::from(i))),
                });
            }
            NodeKind::ShadingGroup { members } => {
                doc.members = Some(MembersDoc {
                    ids: join_numbers(members.iter().map(|id| id.0 as f64)),
                });
            }
            NodeKind::Instancer(params) => doc.instancer = Some(InstancerDoc::from_params(params)),
        }
        doc
    }

    fn into_node(self) -> PersistResult<SceneNode> {
        let kind = match self.kind.as_str() {
            "transform" => NodeKind::Transform {
                shape: self.shape.map(NodeId::new),
            },
            "curve" => NodeKind::Curve(
                self.curve
                    .as_ref()
                    .ok_or_else(|| missing(&self.name, "curve"))?
                    .to_geometry()?,
            ),
            "mesh" => {
                let mesh = self.mesh.as_ref().ok_or_else(|| missing(&self.name, "mesh"))?;
                NodeKind::Mesh(mesh.to_shape()?)
            }
            "shadingGroup" => {
                let members = match &self.members {
                    Some(doc) => parse_indices(&doc.ids)?
                        .into_iter()
                        .map(NodeId::new)
                        .collect(),
                    None => BTreeSet::new(),
                };
                NodeKind::ShadingGroup { members }
            }
            "instancer" => NodeKind::Instancer(
                self.instancer
                    .as_ref()
                    .ok_or_else(|| missing(&self.name, "instancer"))?
                    .to_params()?,
            ),
            other => {
                return Err(PersistError::Invalid(format!(
                    "onbekend node-type `{other}` bij `{}`",
                    self.name
                )));
            }
        };

        let mut node = SceneNode::new(NodeId::new(self.id), self.name, kind);
        node.parent = self.parent.map(NodeId::new);
        if let Some(transform) = &self.transform {
            node.transform = transform.to_local()?;
        }
        if let Some(display) = &self.display {
            node.overrides = display.to_overrides()?;
        }
        Ok(node)
    }
}

impl TransformDoc {
    fn from_local(local: &LocalTransform) -> Self {
        let t = local.translation;
        let r = local.rotation;
        let s = local.scale;
        Self {
            translate: join_numbers([t.x, t.y, t.z]),
            rotate: join_numbers([r.x, r.y, r.z, r.w]),
            scale: join_numbers([s.x, s.y, s.z]),
        }
    }

    fn to_local(&self) -> PersistResult<LocalTransform> {
        let [tx, ty, tz] = fixed::<3>(&self.translate)?;
        let [rx, ry, rz, rw] = fixed::<4>(&self.rotate)?;
        let [sx, sy, sz] = fixed::<3>(&self.scale)?;
        Ok(LocalTransform {
            translation: Vec3::new(tx, ty, tz),
            rotation: Quaternion::new(rx, ry, rz, rw).normalized(),
            scale: Vec3::new(sx, sy, sz),
        })
    }
}

impl DisplayDoc {
    fn from_overrides(overrides: DisplayOverrides) -> Self {
        Self {
            enabled: overrides.enabled,
            display_type: display_name(overrides.display_type).to_owned(),
            bounding_box: overrides.use_bounding_box_lod,
        }
    }

    fn to_overrides(&self) -> PersistResult<DisplayOverrides> {
        Ok(DisplayOverrides {
            enabled: self.enabled,
            display_type: self.display_type.parse()?,
            use_bounding_box_lod: self.bounding_box,
        })
    }
}

impl CurveDoc {
    fn from_geometry(geometry: &CurveGeometry) -> Self {
        let mut doc = Self {
            curve_type: geometry.kind_name().to_owned(),
            points: String::new(),
            degree: None,
            knots: None,
            weights: None,
        };
        match geometry {
            CurveGeometry::Line(line) => doc.points = join_points(&[line.start, line.end]),
            CurveGeometry::Polyline(polyline) => doc.points = join_points(polyline.points()),
            CurveGeometry::CubicBezier(bezier) => {
                doc.points = join_points(&[bezier.p0, bezier.p1, bezier.p2, bezier.p3]);
            }
            CurveGeometry::Nurbs(nurbs) => {
                doc.points = join_points(nurbs.control_points());
                doc.degree = Some(nurbs.degree());
                doc.knots = Some(join_numbers(nurbs.knots().iter().copied()));
                doc.weights = nurbs.weights().map(|w| join_numbers(w.iter().copied()));
            }
        }
        doc
    }

    fn to_geometry(&self) -> PersistResult<CurveGeometry> {
        let points = parse_points(&self.points)?;
        let invalid = |reason: String| PersistError::Invalid(format!("curve: {reason}"));
        match self.curve_type.as_str() {
            "line" => match points.as_slice() {
                [start, end] => Ok(CurveGeometry::Line(Line3::new(*start, *end))),
                _ => Err(invalid(format!("lijn verwacht 2 punten, kreeg {}", points.len()))),
            },
            "polyline" => Polyline3::new(points).map(CurveGeometry::Polyline).map_err(invalid),
            "bezier" => match points.as_slice() {
                [p0, p1, p2, p3] => Ok(CurveGeometry::CubicBezier(CubicBezier3::new(
                    *p0, *p1, *p2, *p3,
                ))),
                _ => Err(invalid(format!("bezier verwacht 4 punten, kreeg {}", points.len()))),
            },
            "nurbs" => {
                let degree = self
                    .degree
                    .ok_or_else(|| invalid("nurbs mist `degree`".to_owned()))?;
                let knots = match &self.knots {
                    Some(text) => parse_numbers(text)?,
                    None => NurbsCurve3::clamped_uniform_knots(degree, points.len()),
                };
                let weights = self.weights.as_deref().map(parse_numbers).transpose()?;
                NurbsCurve3::new(degree, points, knots, weights)
                    .map(CurveGeometry::Nurbs)
                    .map_err(invalid)
            }
            other => Err(invalid(format!("onbekend curvetype `{other}`"))),
        }
    }
}

impl MeshDoc {
    fn to_shape(&self) -> PersistResult<MeshShape> {
        let vertices = parse_points(&self.vertices)?;
        let indices = parse_indices(&self.triangles)?;
        if indices.len() % 3 != 0 {
            return Err(PersistError::Invalid(
                "mesh: aantal driehoeksindices is geen veelvoud van 3".to_owned(),
            ));
        }
        let mut triangles = Vec::with_capacity(indices.len() / 3);
        for chunk in indices.chunks_exact(3) {
            let mut triangle = [0_u32; 3];
            for (slot, &index) in triangle.iter_mut().zip(chunk) {
                if index >= vertices.len() {
                    return Err(PersistError::Invalid(format!(
                        "mesh: index {index} buiten bereik"
                    )));
                }
                *slot = u32::try_from(index)
                    .map_err(|_| PersistError::Invalid(format!("mesh: index {index} te groot")))?;
            }
            triangles.push(triangle);
        }
        Ok(MeshShape {
            vertices,
            triangles,
        })
    }
}

impl InstancerDoc {
    fn from_params(params: &InstancerParams) -> Self {
        Self {
            mode: match params.mode() {
                InstancingMode::Count => "count",
                InstancingMode::Distance => "distance",
            }
            .to_owned(),
            count: params.instance_count(),
            spacing: params.instance_spacing(),
            max_by_length: params.max_instances_by_length(),
            display_type: display_name(params.display_type()).to_owned(),
            bounding_box: params.use_bounding_box_lod(),
        }
    }

    fn to_params(&self) -> PersistResult<InstancerParams> {
        let mut params = InstancerParams::default();
        params.set_mode(self.mode.parse()?);
        params.set_instance_count(i64::from(self.count));
        params.set_instance_spacing(self.spacing)?;
        params.set_max_instances_by_length(i64::from(self.max_by_length));
        params.set_display_type(self.display_type.parse()?);
        params.set_use_bounding_box_lod(self.bounding_box);
        Ok(params)
    }
}

fn display_name(display_type: DisplayType) -> &'static str {
    match display_type {
        DisplayType::Normal => "normal",
        DisplayType::Template => "template",
        DisplayType::Reference => "reference",
    }
}

fn missing(node: &str, element: &str) -> PersistError {
    PersistError::Invalid(format!("node `{node}` mist het `<{element}>`-element"))
}

fn join_numbers<I: IntoIterator<Item = f64>>(values: I) -> String {
    let mut out = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{value}");
    }
    out
}

fn join_points(points: &[Point3]) -> String {
    join_numbers(points.iter().flat_map(|p| p.to_array()))
}

fn parse_numbers(text: &str) -> PersistResult<Vec<f64>> {
    text.split_whitespace()
        .map(|part| part.parse::<f64>().map_err(PersistError::from))
        .collect()
}

fn parse_indices(text: &str) -> PersistResult<Vec<usize>> {
    text.split_whitespace()
        .map(|part| part.parse::<usize>().map_err(PersistError::from))
        .collect()
}

fn parse_points(text: &str) -> PersistResult<Vec<Point3>> {
    let numbers = parse_numbers(text)?;
    if numbers.len() % 3 != 0 {
        return Err(PersistError::Invalid(format!(
            "puntenlijst heeft {} getallen, geen veelvoud van 3",
            numbers.len()
        )));
    }
    Ok(numbers
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect())
}

fn fixed<const N: usize>(text: &str) -> PersistResult<[f64; N]> {
    let numbers = parse_numbers(text)?;
    <[f64; N]>::try_from(numbers.as_slice()).map_err(|_| {
        PersistError::Invalid(format!("verwacht {N} getallen, kreeg `{text}`"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instancing::SlotIndex;
    use crate::scene::Plug;

    fn sample_scene() -> (Scene, NodeId) {
        let mut scene = Scene::new();
        let nurbs = NurbsCurve3::new(
            3,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 2.0, 0.0),
                Point3::new(3.0, 2.0, 0.5),
                Point3::new(4.0, 0.0, 0.0),
            ],
            NurbsCurve3::clamped_uniform_knots(3, 4),
            Some(vec![1.0, 2.0, 2.0, 1.0]),
        )
        .unwrap();
        let (curve, _) = scene
            .add_shaped("curve#", NodeKind::Curve(CurveGeometry::Nurbs(nurbs)), None)
            .unwrap();
        let (cube, cube_shape) = scene
            .add_shaped("cube#", NodeKind::Mesh(MeshShape::unit_cube()), None)
            .unwrap();
        scene
            .add_node(
                "lambert2SG",
                NodeKind::ShadingGroup {
                    members: [cube_shape].into_iter().collect(),
                },
                None,
            )
            .unwrap();

        let mut params = InstancerParams::default();
        params.set_mode(InstancingMode::Distance);
        params.set_instance_spacing(0.75).unwrap();
        params.set_display_type(DisplayType::Template);
        let instancer = scene
            .add_node("instancer#", NodeKind::Instancer(params), None)
            .unwrap();
        scene
            .connect(PlugRef::message(curve), PlugRef::new(instancer, Plug::InputCurve))
            .unwrap();
        scene
            .connect(PlugRef::message(cube), PlugRef::new(instancer, Plug::InputTransform))
            .unwrap();

        for slot in [4, 0, 2] {
            let copy = scene.duplicate_instance(cube, instancer).unwrap();
            scene
                .connect(
                    PlugRef::message(copy),
                    PlugRef::new(instancer, Plug::KnownInstance(SlotIndex::new(slot))),
                )
                .unwrap();
        }
        (scene, instancer)
    }

    #[test]
    fn scene_survives_a_write_read_cycle() {
        let (scene, instancer) = sample_scene();
        let xml = write_scene(&scene).unwrap();
        assert!(xml.starts_with("<scene"));

        let restored = read_scene(&xml).unwrap();
        assert_eq!(restored.nodes(), scene.nodes());
        assert_eq!(restored.connections(), scene.connections());

        let params = restored.node(instancer).unwrap().instancer_params().unwrap();
        assert_eq!(params.mode(), InstancingMode::Distance);
        assert!((params.instance_spacing() - 0.75).abs() < 1e-12);
        assert_eq!(restored.peek_next_id(), scene.peek_next_id());
    }

    #[test]
    fn slot_order_is_kept() {
        let (scene, instancer) = sample_scene();
        let restored = read_scene(&write_scene(&scene).unwrap()).unwrap();
        let slots: Vec<u32> = restored
            .connections()
            .iter()
            .filter(|conn| conn.to.node == instancer)
            .filter_map(|conn| match conn.to.plug {
                Plug::KnownInstance(slot) => Some(slot.get()),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![4, 0, 2]);
    }

    #[test]
    fn hand_written_document_is_read() {
        let xml = r#"
            <scene version="1">
              <nodes>
                <node id="0" name="curve1" kind="transform" shape="1">
                  <transform translate="0 0 0" rotate="0 0 0 1" scale="1 1 1"/>
                </node>
                <node id="1" name="curveShape1" kind="curve" parent="0">
                  <curve type="polyline" points="0 0 0 1 0 0 1 1 0"/>
                </node>
                <node id="2" name="instancer1" kind="instancer">
                  <instancer mode="1" count="3" spacing="0.5" maxByLength="10" display="0" bbox="true"/>
                </node>
              </nodes>
              <connections>
                <connection from="0.message" to="2.inputCurve"/>
              </connections>
            </scene>"#;
        let scene = read_scene(xml).unwrap();
        assert_eq!(scene.node_count(), 3);
        let params = scene.node(NodeId::new(2)).unwrap().instancer_params().unwrap();
        assert_eq!(params.mode(), InstancingMode::Distance);
        assert_eq!(params.display_type(), DisplayType::Normal);
        assert!(params.use_bounding_box_lod());
        assert_eq!(scene.curve_shape(NodeId::new(0)), Some(NodeId::new(1)));
    }

    #[test]
    fn invalid_spacing_is_rejected() {
        let xml = r#"<scene><nodes>
            <node id="0" name="instancer1" kind="instancer">
              <instancer mode="count" count="3" spacing="0" maxByLength="10" display="reference" bbox="false"/>
            </node></nodes></scene>"#;
        assert!(matches!(read_scene(xml), Err(PersistError::Param(_))));
    }

    #[test]
    fn dangling_connection_is_rejected() {
        let xml = r#"<scene><nodes>
            <node id="0" name="instancer1" kind="instancer">
              <instancer mode="count" count="3" spacing="1" maxByLength="10" display="reference" bbox="false"/>
            </node></nodes>
            <connections><connection from="9.message" to="0.inputCurve"/></connections></scene>"#;
        assert!(matches!(read_scene(xml), Err(PersistError::Scene(_))));
    }

    #[test]
    fn newer_versions_are_refused() {
        let xml = r#"<scene version="99"><nodes/></scene>"#;
        assert!(matches!(read_scene(xml), Err(PersistError::Version(99))));
    }
}
