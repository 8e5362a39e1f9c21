//! A scene plus the runtime state of every instancer in it.
//!
//! All edits that matter to an instancer go through the session so that
//! curve watches follow connections and dirty flags see every change.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::geom::{CurveGeometry, Point3, Transform, Vec3};
use crate::instancing::{
    ChangeKind, InstancerParams, ParamError, ParamKind, ParamValue, Reconciler, SlotEntry,
    TickError, TickReport,
};
use crate::persist::{self, PersistError};
use crate::scene::{
    InstancerView, LocalTransform, MeshShape, NodeId, NodeKind, Plug, PlugRef, Removal, Scene,
    SceneError, SceneNode, WatchId,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error("node {0} is not an instancer")]
    NotAnInstancer(NodeId),
    #[error("evaluating instancer {node} failed: {source}")]
    Tick {
        node: NodeId,
        #[source]
        source: TickError,
    },
}

/// Axis cross drawn for an instancer: three unit lines through its origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatorMarker {
    /// Line segments in the instancer's local space.
    pub lines: [(Point3, Point3); 3],
    /// Instancer world transform at draw time.
    pub world: Transform,
}

impl LocatorMarker {
    const HALF: f64 = 0.5;

    #[must_use]
    pub fn new(world: Transform) -> Self {
        let h = Self::HALF;
        Self {
            lines: [
                (Point3::new(-h, 0.0, 0.0), Point3::new(h, 0.0, 0.0)),
                (Point3::new(0.0, -h, 0.0), Point3::new(0.0, h, 0.0)),
                (Point3::new(0.0, 0.0, -h), Point3::new(0.0, 0.0, h)),
            ],
            world,
        }
    }

    /// Line segments in world space.
    #[must_use]
    pub fn world_lines(&self) -> [(Point3, Point3); 3] {
        self.lines
            .map(|(a, b)| (self.world.apply_point(a), self.world.apply_point(b)))
    }
}

#[derive(Debug, Default)]
pub struct Session {
    scene: Scene,
    runtimes: BTreeMap<NodeId, Reconciler<WatchId>>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a scene, e.g. one read from disk. Every instancer gets a fresh
    /// runtime and its curve watches are reinstalled.
    #[must_use]
    pub fn from_scene(mut scene: Scene) -> Self {
        scene.watches_mut().clear();
        let mut session = Self {
            scene,
            runtimes: BTreeMap::new(),
        };
        let instancers: Vec<NodeId> = session
            .scene
            .nodes()
            .iter()
            .filter(|node| node.instancer_params().is_some())
            .map(|node| node.id)
            .collect();
        for id in instancers {
            session.runtimes.insert(id, Reconciler::new());
            let curve = session
                .scene
                .sources_of(PlugRef::new(id, Plug::InputCurve))
                .first()
                .copied();
            if let Some(curve) = curve {
                session.watch_curve(id, curve);
            }
        }
        session
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[must_use]
    pub fn into_scene(self) -> Scene {
        self.scene
    }

    /// Serialize the scene. Slot assignments are stored as connections.
    pub fn save(&self) -> Result<String, PersistError> {
        persist::save_scene(&self.scene)
    }

    /// Read a saved scene and rebuild the instancer runtimes.
    pub fn load(xml: &str) -> Result<Self, PersistError> {
        Ok(Self::from_scene(persist::load_scene(xml)?))
    }

    pub fn add_transform(&mut self, name: &str, parent: Option<NodeId>) -> Result<NodeId, SessionError> {
        Ok(self
            .scene
            .add_node(name, NodeKind::Transform { shape: None }, parent)?)
    }

    /// Add a curve transform with its shape. Returns the transform.
    pub fn add_curve(&mut self, name: &str, geometry: CurveGeometry) -> Result<NodeId, SessionError> {
        let (transform, _) = self.scene.add_shaped(name, NodeKind::Curve(geometry), None)?;
        Ok(transform)
    }

    /// Add a mesh transform with its shape. Returns the transform.
    pub fn add_mesh(&mut self, name: &str, mesh: MeshShape) -> Result<NodeId, SessionError> {
        let (transform, _) = self.scene.add_shaped(name, NodeKind::Mesh(mesh), None)?;
        Ok(transform)
    }

    pub fn add_shading_group(&mut self, name: &str, members: &[NodeId]) -> Result<NodeId, SessionError> {
        let group = self.scene.add_node(
            name,
            NodeKind::ShadingGroup {
                members: Default::default(),
            },
            None,
        )?;
        for &member in members {
            let target = self
                .scene
                .node(member)
                .and_then(SceneNode::shape)
                .unwrap_or(member);
            self.scene.add_group_member(group, target)?;
        }
        Ok(group)
    }

    pub fn set_local_transform(&mut self, id: NodeId, transform: LocalTransform) -> Result<(), SessionError> {
        Ok(self.scene.set_local_transform(id, transform)?)
    }

    pub fn set_translation(&mut self, id: NodeId, translation: Vec3) -> Result<(), SessionError> {
        let mut transform = self
            .scene
            .node(id)
            .ok_or(SceneError::UnknownNode(id))?
            .transform;
        transform.translation = translation;
        self.set_local_transform(id, transform)
    }

    pub fn set_curve_geometry(&mut self, id: NodeId, geometry: CurveGeometry) -> Result<(), SessionError> {
        Ok(self.scene.set_curve_geometry(id, geometry)?)
    }

    pub fn create_instancer(&mut self, name: &str) -> Result<NodeId, SessionError> {
        let id = self.scene.add_node(
            name,
            NodeKind::Instancer(InstancerParams::default()),
            None,
        )?;
        self.runtimes.insert(id, Reconciler::new());
        log::debug!("instancer {id} created");
        Ok(id)
    }

    /// Recreate an instancer under a known id and name.
    pub fn restore_instancer(
        &mut self,
        id: NodeId,
        name: &str,
        params: InstancerParams,
    ) -> Result<NodeId, SessionError> {
        let node = SceneNode::new(id, name, NodeKind::Instancer(params));
        self.scene.insert_node(node)?;
        self.runtimes.insert(id, Reconciler::new());
        Ok(id)
    }

    pub fn connect(&mut self, from: PlugRef, to: PlugRef) -> Result<(), SessionError> {
        self.scene.connect(from, to)?;
        if to.plug == Plug::InputCurve {
            self.watch_curve(to.node, from.node);
        }
        if let Some(runtime) = self.runtimes.get_mut(&to.node) {
            runtime.notify(ChangeKind::Connection);
        }
        Ok(())
    }

    pub fn disconnect(&mut self, from: PlugRef, to: PlugRef) -> Result<(), SessionError> {
        self.scene.disconnect(from, to)?;
        if let Some(runtime) = self.runtimes.get_mut(&to.node) {
            if to.plug == Plug::InputCurve {
                runtime.notifier_mut().curve_disconnected(self.scene.watches_mut());
            }
            runtime.notify(ChangeKind::Connection);
        }
        Ok(())
    }

    /// Delete a node and everything below it.
    pub fn delete_node(&mut self, id: NodeId) -> Result<Removal, SessionError> {
        let removal = self.scene.delete_node(id)?;

        let mut rewatch = BTreeSet::new();
        for node in &removal.nodes {
            rewatch.extend(self.scene.watches().subscribers_of(*node));
        }

        for node in &removal.nodes {
            if let Some(mut runtime) = self.runtimes.remove(node) {
                runtime.notifier_mut().curve_disconnected(self.scene.watches_mut());
            }
        }
        for conn in &removal.connections {
            if let Some(runtime) = self.runtimes.get_mut(&conn.to.node) {
                if conn.to.plug == Plug::InputCurve {
                    runtime.notifier_mut().curve_disconnected(self.scene.watches_mut());
                }
                runtime.notify(ChangeKind::Connection);
            }
        }

        // Watches on deleted nodes are rebuilt from the current curve input.
        for instancer in rewatch {
            if !self.runtimes.contains_key(&instancer) {
                continue;
            }
            let curve = self
                .scene
                .sources_of(PlugRef::new(instancer, Plug::InputCurve))
                .first()
                .copied();
            match curve {
                Some(curve) => self.watch_curve(instancer, curve),
                None => {
                    if let Some(runtime) = self.runtimes.get_mut(&instancer) {
                        runtime.notifier_mut().curve_disconnected(self.scene.watches_mut());
                        runtime.notify(ChangeKind::CurveShape);
                    }
                }
            }
        }
        Ok(removal)
    }

    pub fn params(&self, id: NodeId) -> Result<InstancerParams, SessionError> {
        self.scene
            .node(id)
            .and_then(SceneNode::instancer_params)
            .copied()
            .ok_or(SessionError::NotAnInstancer(id))
    }

    /// Edit one parameter. Returns `true` if the stored value changed.
    pub fn set_param(&mut self, id: NodeId, kind: ParamKind, value: &ParamValue) -> Result<bool, SessionError> {
        let params = self
            .scene
            .node_mut(id)
            .and_then(SceneNode::instancer_params_mut)
            .ok_or(SessionError::NotAnInstancer(id))?;
        let changed = params.apply(kind, value)?;
        if changed {
            if let Some(runtime) = self.runtimes.get_mut(&id) {
                runtime.notify(ChangeKind::Parameter(kind));
            }
        }
        Ok(changed)
    }

    pub fn instancers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.runtimes.keys().copied()
    }

    /// Managed instances of `id` in physical order.
    pub fn instances(&self, id: NodeId) -> Result<Vec<SlotEntry<NodeId>>, SessionError> {
        if !self.runtimes.contains_key(&id) {
            return Err(SessionError::NotAnInstancer(id));
        }
        Ok(self
            .scene
            .connections()
            .iter()
            .filter_map(|conn| match conn.to.plug {
                Plug::KnownInstance(slot) if conn.to.node == id => {
                    Some(SlotEntry::new(slot, conn.from.node))
                }
                _ => None,
            })
            .collect())
    }

    /// Whether `id` will reposition its instances on the next evaluation.
    pub fn is_dirty(&mut self, id: NodeId) -> Result<bool, SessionError> {
        self.dispatch_signals();
        self.runtimes
            .get(&id)
            .map(|runtime| runtime.notifier().is_dirty())
            .ok_or(SessionError::NotAnInstancer(id))
    }

    /// Reconcile one instancer.
    pub fn evaluate_node(&mut self, id: NodeId) -> Result<TickReport, SessionError> {
        self.dispatch_signals();
        let runtime = self
            .runtimes
            .get_mut(&id)
            .ok_or(SessionError::NotAnInstancer(id))?;
        let mut view = InstancerView::new(&mut self.scene, id)?;
        runtime
            .tick(&mut view)
            .map_err(|source| SessionError::Tick { node: id, source })
    }

    /// Reconcile every instancer, in id order.
    pub fn evaluate(&mut self) -> Result<Vec<(NodeId, TickReport)>, SessionError> {
        let ids: Vec<NodeId> = self.runtimes.keys().copied().collect();
        ids.into_iter()
            .map(|id| self.evaluate_node(id).map(|report| (id, report)))
            .collect()
    }

    /// Draw hook: reconcile `id`, then return its marker.
    pub fn draw(&mut self, id: NodeId) -> Result<LocatorMarker, SessionError> {
        let report = self.evaluate_node(id)?;
        if report.changed_scene() {
            log::trace!("draw of {id} updated the scene: {report:?}");
        }
        Ok(LocatorMarker::new(self.scene.world_transform(id)))
    }

    fn watch_curve(&mut self, instancer: NodeId, curve: NodeId) {
        let Some(runtime) = self.runtimes.get_mut(&instancer) else {
            return;
        };
        let mut targets = vec![curve];
        if let Some(shape) = self.scene.curve_shape(curve) {
            targets.push(shape);
        }
        runtime
            .notifier_mut()
            .curve_connected(self.scene.watches_mut(), instancer, &targets);
    }

    fn dispatch_signals(&mut self) {
        for signal in self.scene.watches_mut().take_signals() {
            if let Some(runtime) = self.runtimes.get_mut(&signal.subscriber) {
                runtime.notify(signal.kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Line3, Tolerance};
    use crate::instancing::{DisplayType, SlotIndex, SyncState};

    struct Fixture {
        session: Session,
        curve: NodeId,
        cube: NodeId,
        instancer: NodeId,
    }

    fn fixture() -> Fixture {
        let mut session = Session::new();
        let curve = session
            .add_curve(
                "curve#",
                CurveGeometry::Line(Line3::new(Point3::ORIGIN, Point3::new(10.0, 0.0, 0.0))),
            )
            .unwrap();
        let cube = session.add_mesh("cube#", MeshShape::unit_cube()).unwrap();
        let instancer = session.create_instancer("instancer#").unwrap();
        session
            .connect(PlugRef::message(curve), PlugRef::new(instancer, Plug::InputCurve))
            .unwrap();
        session
            .connect(PlugRef::message(cube), PlugRef::new(instancer, Plug::InputTransform))
            .unwrap();
        Fixture {
            session,
            curve,
            cube,
            instancer,
        }
    }

    fn xs(session: &Session, instancer: NodeId) -> Vec<f64> {
        session
            .instances(instancer)
            .unwrap()
            .iter()
            .map(|entry| session.scene().node(entry.instance).unwrap().transform.translation.x)
            .collect()
    }

    #[test]
    fn connecting_a_curve_installs_watches() {
        let f = fixture();
        assert_eq!(f.session.scene().watches().watch_count(f.instancer), 2);
        assert!(f.session.scene().watches().is_watched(f.curve));
    }

    #[test]
    fn draw_reconciles_and_returns_marker() {
        let mut f = fixture();
        let marker = f.session.draw(f.instancer).unwrap();
        assert_eq!(marker.lines[0].0, Point3::new(-0.5, 0.0, 0.0));
        assert_eq!(f.session.instances(f.instancer).unwrap().len(), 5);
        assert!(!f.session.is_dirty(f.instancer).unwrap());
    }

    #[test]
    fn moving_the_curve_repositions_instances() {
        let mut f = fixture();
        f.session.evaluate().unwrap();

        f.session
            .set_translation(f.curve, Vec3::new(0.0, 0.0, 3.0))
            .unwrap();
        assert!(f.session.is_dirty(f.instancer).unwrap());

        let report = f.session.evaluate_node(f.instancer).unwrap();
        assert_eq!(report.state, SyncState::InSync);
        assert_eq!(report.repositioned, 5);
        for entry in f.session.instances(f.instancer).unwrap() {
            let z = f.session.scene().node(entry.instance).unwrap().transform.translation.z;
            assert!((z - 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn reshaping_the_curve_repositions_instances() {
        let mut f = fixture();
        f.session.evaluate().unwrap();

        f.session
            .set_curve_geometry(
                f.curve,
                CurveGeometry::Line(Line3::new(Point3::ORIGIN, Point3::new(20.0, 0.0, 0.0))),
            )
            .unwrap();
        f.session.evaluate().unwrap();

        let tol = Tolerance::new(1e-6);
        for (x, expected) in xs(&f.session, f.instancer).iter().zip([0.0, 4.0, 8.0, 12.0, 16.0]) {
            assert!(tol.approx_eq_f64(*x, expected));
        }
    }

    #[test]
    fn disconnected_curve_is_no_longer_watched() {
        let mut f = fixture();
        f.session.evaluate().unwrap();
        f.session
            .disconnect(PlugRef::message(f.curve), PlugRef::new(f.instancer, Plug::InputCurve))
            .unwrap();
        assert_eq!(f.session.scene().watches().watch_count(f.instancer), 0);

        let report = f.session.evaluate_node(f.instancer).unwrap();
        assert!(report.skipped.is_some());
        assert_eq!(f.session.instances(f.instancer).unwrap().len(), 5);
    }

    #[test]
    fn parameter_edits_flow_through() {
        let mut f = fixture();
        f.session.evaluate().unwrap();

        assert!(
            f.session
                .set_param(f.instancer, ParamKind::InstanceCount, &ParamValue::Integer(3))
                .unwrap()
        );
        let report = f.session.evaluate_node(f.instancer).unwrap();
        assert_eq!(report.removed, vec![SlotIndex::new(4), SlotIndex::new(3)]);

        f.session
            .set_param(f.instancer, ParamKind::DisplayType, &ParamValue::Text("normal".into()))
            .unwrap();
        let report = f.session.evaluate_node(f.instancer).unwrap();
        assert_eq!(report.overrides_applied, 3);
        for entry in f.session.instances(f.instancer).unwrap() {
            let node = f.session.scene().node(entry.instance).unwrap();
            assert_eq!(node.overrides.display_type, DisplayType::Normal);
        }

        let err = f
            .session
            .set_param(f.instancer, ParamKind::InstanceSpacing, &ParamValue::Number(0.0))
            .unwrap_err();
        assert!(matches!(err, SessionError::Param(ParamError::InvalidSpacing(_))));
    }

    #[test]
    fn deleting_the_instancer_drops_runtime_and_instances() {
        let mut f = fixture();
        f.session.evaluate().unwrap();
        let before = f.session.scene().node_count();

        f.session.delete_node(f.instancer).unwrap();
        assert_eq!(f.session.scene().node_count(), before - 6);
        assert_eq!(f.session.instancers().count(), 0);
        assert!(f.session.scene().watches().is_empty());
        assert!(f.session.scene().node(f.cube).is_some());
    }

    #[test]
    fn reloaded_scene_rewatches_curves() {
        let mut f = fixture();
        f.session.evaluate().unwrap();
        let mut session = Session::from_scene(f.session.into_scene());

        assert_eq!(session.instancers().collect::<Vec<_>>(), vec![f.instancer]);
        assert_eq!(session.scene().watches().watch_count(f.instancer), 2);
        let report = session.evaluate_node(f.instancer).unwrap();
        assert!(report.created.is_empty());
        assert!(report.removed.is_empty());

        session
            .set_translation(f.curve, Vec3::new(0.0, 1.0, 0.0))
            .unwrap();
        assert!(session.is_dirty(f.instancer).unwrap());
    }

    #[test]
    fn saved_slots_survive_a_reload() {
        let mut f = fixture();
        f.session
            .set_param(f.instancer, ParamKind::InstanceCount, &ParamValue::Integer(3))
            .unwrap();
        f.session.evaluate().unwrap();
        let before = f.session.instances(f.instancer).unwrap();

        let xml = f.session.save().unwrap();
        let mut session = Session::load(&xml).unwrap();
        assert_eq!(session.instances(f.instancer).unwrap(), before);
        assert_eq!(session.params(f.instancer).unwrap().instance_count(), 3);

        let report = session.evaluate_node(f.instancer).unwrap();
        assert_eq!(report.state, SyncState::InSync);
        assert!(report.created.is_empty());
        assert!(report.removed.is_empty());
        assert_eq!(xs(&session, f.instancer), xs(&f.session, f.instancer));
    }

    #[test]
    fn deleting_the_curve_shape_drops_its_watch() {
        let mut f = fixture();
        f.session.evaluate().unwrap();
        let shape = f.session.scene().curve_shape(f.curve).expect("curve shape");

        f.session.delete_node(shape).unwrap();
        let watches = f.session.scene().watches();
        assert!(!watches.is_watched(shape));
        assert!(watches.is_watched(f.curve));
        assert_eq!(watches.watch_count(f.instancer), 1);

        let report = f.session.evaluate_node(f.instancer).unwrap();
        assert!(report.skipped.is_some());
        assert!(f.session.is_dirty(f.instancer).unwrap());
    }
}
