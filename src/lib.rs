#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Procedurele instancing van een referentie-object langs een 3D-curve.
//!
//! De kern ([`instancing`]) houdt een set duplicaten in sync met een curve en
//! een paar parameters. [`scene`] levert de scene graph waarin dat gebeurt,
//! [`session`] en [`command`] vormen de bewerkingslaag en [`persist`] leest en
//! schrijft scenes als XML. [`Engine`] stelt dit geheel beschikbaar aan
//! JavaScript.

pub mod command;
pub mod geom;
pub mod instancing;
pub mod persist;
pub mod scene;
pub mod session;

use std::fmt;

use serde::Serialize;
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

use command::CommandHistory;
use geom::{CurveGeometry, Point3, Polyline3, Vec3};
use instancing::{ParamKind, ParamValue, SyncState, TickReport};
use scene::{MeshShape, NodeId};
use session::{Session, SessionError};

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {}

#[derive(Debug, Serialize, Clone, PartialEq)]
struct InstanceExport {
    slot: u32,
    id: usize,
    name: String,
    translation: [f64; 3],
    rotation: [f64; 4],
}

#[derive(Debug, Serialize, Clone, PartialEq)]
struct ReportExport {
    instancer: usize,
    state: &'static str,
    target: usize,
    created: usize,
    removed: usize,
    repositioned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<String>,
}

impl ReportExport {
    fn new(instancer: NodeId, report: &TickReport) -> Self {
        Self {
            instancer: instancer.0,
            state: match report.state {
                SyncState::InSync => "inSync",
                SyncState::Growing(_) => "growing",
                SyncState::Shrinking(_) => "shrinking",
            },
            target: report.target,
            created: report.created.len(),
            removed: report.removed.len(),
            repositioned: report.repositioned,
            skipped: report.skipped.map(|reason| format!("{reason:?}")),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
struct MarkerExport {
    lines: Vec<[[f64; 3]; 2]>,
}

/// Public entry point for consumers.
#[wasm_bindgen]
pub struct Engine {
    initialized: bool,
    session: Session,
    history: CommandHistory,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl Engine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Engine {
        Engine {
            initialized: true,
            session: Session::new(),
            history: CommandHistory::new(),
        }
    }

    /// Geeft terug of de engine de minimale initialisatie heeft doorlopen.
    #[wasm_bindgen]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Voeg een polyline-curve toe uit een platte lijst `x y z x y z ...`.
    #[wasm_bindgen]
    pub fn add_curve(&mut self, name: &str, coordinates: Vec<f64>) -> Result<u32, JsValue> {
        let points = points_from_flat(&coordinates).map_err(|err| js_error(&err))?;
        let polyline = Polyline3::new(points).map_err(|err| js_error(&err))?;
        let id = self
            .session
            .add_curve(name, CurveGeometry::Polyline(polyline))
            .map_err(to_js_error)?;
        node_handle(id)
    }

    /// Vervang de punten van een bestaande curve.
    #[wasm_bindgen]
    pub fn set_curve_points(&mut self, id: u32, coordinates: Vec<f64>) -> Result<(), JsValue> {
        let points = points_from_flat(&coordinates).map_err(|err| js_error(&err))?;
        let polyline = Polyline3::new(points).map_err(|err| js_error(&err))?;
        self.session
            .set_curve_geometry(NodeId::new(id as usize), CurveGeometry::Polyline(polyline))
            .map_err(to_js_error)
    }

    /// Voeg een eenheidskubus toe die als referentie-object kan dienen.
    #[wasm_bindgen]
    pub fn add_cube(&mut self, name: &str) -> Result<u32, JsValue> {
        let id = self
            .session
            .add_mesh(name, MeshShape::unit_cube())
            .map_err(to_js_error)?;
        node_handle(id)
    }

    #[wasm_bindgen]
    pub fn set_translation(&mut self, id: u32, x: f64, y: f64, z: f64) -> Result<(), JsValue> {
        self.session
            .set_translation(NodeId::new(id as usize), Vec3::new(x, y, z))
            .map_err(to_js_error)
    }

    /// Maak een instancer uit een selectie: eerst de curve, dan het object.
    #[wasm_bindgen]
    pub fn create_from_selection(&mut self, selection: Vec<u32>) -> Result<u32, JsValue> {
        let selection: Vec<NodeId> = selection
            .into_iter()
            .map(|id| NodeId::new(id as usize))
            .collect();
        let id = self
            .history
            .execute(&mut self.session, &selection)
            .map_err(to_js_error)?;
        node_handle(id)
    }

    /// Stel een parameter in op naam, bijvoorbeeld `instanceCount`.
    #[wasm_bindgen]
    pub fn set_param(&mut self, id: u32, name: &str, value: f64) -> Result<bool, JsValue> {
        let kind = ParamKind::from_name(name).map_err(to_js_error)?;
        self.session
            .set_param(NodeId::new(id as usize), kind, &ParamValue::Number(value))
            .map_err(to_js_error)
    }

    /// Breng alle instancers in sync en geef per instancer een rapport terug.
    #[wasm_bindgen]
    pub fn evaluate(&mut self) -> Result<JsValue, JsValue> {
        let reports: Vec<ReportExport> = self
            .session
            .evaluate()
            .map_err(to_js_error)?
            .iter()
            .map(|(id, report)| ReportExport::new(*id, report))
            .collect();
        serde_wasm_bindgen::to_value(&reports).map_err(|err| JsError::new(&err.to_string()).into())
    }

    /// Teken een instancer: synchroniseer en geef het locator-kruis terug.
    #[wasm_bindgen]
    pub fn draw(&mut self, id: u32) -> Result<JsValue, JsValue> {
        let marker = self
            .session
            .draw(NodeId::new(id as usize))
            .map_err(to_js_error)?;
        let lines = marker
            .world_lines()
            .iter()
            .map(|(a, b)| [a.to_array(), b.to_array()])
            .collect();
        serde_wasm_bindgen::to_value(&MarkerExport { lines })
            .map_err(|err| JsError::new(&err.to_string()).into())
    }

    /// Beheerde instances van een instancer, in fysieke volgorde.
    #[wasm_bindgen]
    pub fn get_instances(&self, id: u32) -> Result<JsValue, JsValue> {
        let instances =
            instance_exports(&self.session, NodeId::new(id as usize)).map_err(to_js_error)?;
        serde_wasm_bindgen::to_value(&instances).map_err(|err| JsError::new(&err.to_string()).into())
    }

    #[wasm_bindgen]
    pub fn undo(&mut self) -> Result<bool, JsValue> {
        self.history
            .undo(&mut self.session)
            .map(|undone| undone.is_some())
            .map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn redo(&mut self) -> Result<bool, JsValue> {
        self.history
            .redo(&mut self.session)
            .map(|redone| redone.is_some())
            .map_err(to_js_error)
    }

    /// Schrijf de scene als XML.
    #[wasm_bindgen]
    pub fn save(&self) -> Result<String, JsValue> {
        self.session.save().map_err(to_js_error)
    }

    /// Laad een scene uit XML. De undo-geschiedenis wordt gewist.
    #[wasm_bindgen]
    pub fn load(&mut self, xml: &str) -> Result<(), JsValue> {
        self.session = Session::load(xml).map_err(to_js_error)?;
        self.history = CommandHistory::new();
        Ok(())
    }
}

fn points_from_flat(coordinates: &[f64]) -> Result<Vec<Point3>, String> {
    if coordinates.len() % 3 != 0 {
        return Err(format!(
            "coördinatenlijst heeft {} waarden, geen veelvoud van 3",
            coordinates.len()
        ));
    }
    if coordinates.iter().any(|value| !value.is_finite()) {
        return Err("coördinaten moeten eindige getallen zijn".to_owned());
    }
    Ok(coordinates
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect())
}

fn instance_exports(session: &Session, id: NodeId) -> Result<Vec<InstanceExport>, SessionError> {
    let entries = session.instances(id)?;
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let node = session.scene().node(entry.instance)?;
            let rotation = node.transform.rotation;
            Some(InstanceExport {
                slot: entry.slot.get(),
                id: entry.instance.0,
                name: node.name.clone(),
                translation: node.transform.translation.to_array(),
                rotation: [rotation.x, rotation.y, rotation.z, rotation.w],
            })
        })
        .collect())
}

fn node_handle(id: NodeId) -> Result<u32, JsValue> {
    u32::try_from(id.0).map_err(|_| js_error("node-id past niet in een u32"))
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::{Engine, instance_exports, points_from_flat};
    use crate::scene::NodeId;

    #[test]
    fn flat_coordinates_become_points() {
        let points = points_from_flat(&[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].to_array(), [1.0, 2.0, 3.0]);

        assert!(points_from_flat(&[0.0, 1.0]).is_err());
        assert!(points_from_flat(&[0.0, f64::NAN, 0.0]).is_err());
    }

    #[test]
    fn engine_builds_and_undoes_an_instancer() {
        let mut engine = Engine::new();
        assert!(engine.is_initialized());
        let curve = engine
            .add_curve("curve#", vec![0.0, 0.0, 0.0, 4.0, 0.0, 0.0])
            .unwrap();
        let cube = engine.add_cube("cube#").unwrap();
        let instancer = engine.create_from_selection(vec![curve, cube]).unwrap();

        assert!(engine.set_param(instancer, "instanceCount", 3.0).unwrap());
        engine.session.evaluate().unwrap();

        let instances = instance_exports(&engine.session, NodeId::new(instancer as usize)).unwrap();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[0].slot, 0);
        let xs: Vec<f64> = instances.iter().map(|i| i.translation[0]).collect();
        assert!((xs[1] - 4.0 / 3.0).abs() < 1e-6);

        assert!(engine.undo().unwrap());
        assert!(engine.session.instancers().next().is_none());
        assert!(engine.redo().unwrap());
        assert_eq!(engine.session.instancers().count(), 1);
    }

    #[test]
    fn engine_reload_keeps_instances() {
        let mut engine = Engine::new();
        let curve = engine
            .add_curve("curve#", vec![0.0, 0.0, 0.0, 0.0, 5.0, 0.0])
            .unwrap();
        let cube = engine.add_cube("cube#").unwrap();
        let instancer = engine.create_from_selection(vec![curve, cube]).unwrap();
        engine.session.evaluate().unwrap();
        let id = NodeId::new(instancer as usize);
        let before = instance_exports(&engine.session, id).unwrap();

        let xml = engine.save().unwrap();
        engine.load(&xml).unwrap();
        assert!(!engine.undo().unwrap());
        assert_eq!(instance_exports(&engine.session, id).unwrap(), before);
    }
}
