//! Koppeling tussen de scene en de instancing-kern.

use super::node::{NodeId, NodeKind};
use super::plug::{Plug, PlugRef};
use super::{Scene, SceneError};
use crate::geom::CurveGeometry;
use crate::instancing::{
    DisplayOverrides, HostError, InstanceFactory, InstancerHost, InstancerParams, MutationBatch,
    Placement, SceneMutator, SlotEntry, WorldCurve,
};

impl From<SceneError> for HostError {
    fn from(err: SceneError) -> Self {
        match err {
            SceneError::UnknownNode(id) => Self::UnknownObject(id.to_string()),
            SceneError::NotDuplicable(id) => Self::DuplicateFailed {
                object: id.to_string(),
                reason: "bron is geen transform of shape".to_owned(),
            },
            other => Self::BatchRejected(other.to_string()),
        }
    }
}

/// Eén instancer-node gezien door de ogen van de reconciler.
#[derive(Debug)]
pub struct InstancerView<'a> {
    scene: &'a mut Scene,
    instancer: NodeId,
}

impl<'a> InstancerView<'a> {
    pub fn new(scene: &'a mut Scene, instancer: NodeId) -> Result<Self, SceneError> {
        let node = scene.node(instancer).ok_or(SceneError::UnknownNode(instancer))?;
        if node.instancer_params().is_none() {
            return Err(SceneError::NotAnInstancer(instancer));
        }
        Ok(Self { scene, instancer })
    }

    #[must_use]
    pub fn instancer(&self) -> NodeId {
        self.instancer
    }

    /// Enige bron van een ingang; `None` bij nul of meerdere bronnen.
    fn single_source(&self, plug: Plug) -> Option<NodeId> {
        match self.scene.sources_of(PlugRef::new(self.instancer, plug)).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

impl InstancerHost for InstancerView<'_> {
    type Handle = NodeId;
    type Curve = WorldCurve<CurveGeometry>;
    type Group = NodeId;

    fn params(&self) -> InstancerParams {
        self.scene
            .node(self.instancer)
            .and_then(|node| node.instancer_params().copied())
            .unwrap_or_default()
    }

    fn input_curve(&self) -> Option<Self::Curve> {
        let source = self.single_source(Plug::InputCurve)?;
        let shape = self.scene.curve_shape(source)?;
        let geometry = self.scene.node(shape)?.curve()?.clone();
        Some(WorldCurve::new(geometry, self.scene.world_transform(shape)))
    }

    fn reference_object(&self) -> Option<NodeId> {
        self.single_source(Plug::InputTransform)
    }

    fn occupied_slots(&self) -> Vec<SlotEntry<NodeId>> {
        self.scene
            .connections()
            .iter()
            .filter_map(|conn| match conn.to.plug {
                Plug::KnownInstance(slot) if conn.to.node == self.instancer => {
                    Some(SlotEntry::new(slot, conn.from.node))
                }
                _ => None,
            })
            .collect()
    }
}

impl InstanceFactory for InstancerView<'_> {
    fn shading_group(&self, reference: NodeId) -> Option<NodeId> {
        match self.scene.shading_groups_of(reference).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    fn spawn_instance(
        &mut self,
        reference: NodeId,
        group: Option<&NodeId>,
        overrides: DisplayOverrides,
    ) -> Result<NodeId, HostError> {
        let instance = self.scene.duplicate_instance(reference, self.instancer)?;
        if let Some(&group) = group {
            if let Err(err) = self.scene.add_group_member(group, instance) {
                self.scene.delete_node(instance)?;
                return Err(err.into());
            }
        }
        if let Some(node) = self.scene.node_mut(instance) {
            node.overrides = overrides;
        }
        log::debug!("instance {instance} gedupliceerd van {reference}");
        Ok(instance)
    }

    fn discard_instance(&mut self, instance: NodeId) -> Result<(), HostError> {
        self.scene.delete_node(instance)?;
        Ok(())
    }
}

impl SceneMutator for InstancerView<'_> {
    fn commit(&mut self, batch: MutationBatch<NodeId>) -> Result<(), HostError> {
        self.scene.apply_batch(self.instancer, batch)?;
        Ok(())
    }

    fn set_placement(&mut self, instance: NodeId, placement: &Placement) -> Result<(), HostError> {
        let mut transform = self
            .scene
            .node(instance)
            .ok_or(SceneError::UnknownNode(instance))?
            .transform;
        transform.translation = placement.translation;
        transform.rotation = placement.rotation;
        self.scene.set_local_transform(instance, transform)?;
        Ok(())
    }

    fn set_display_overrides(
        &mut self,
        instance: NodeId,
        overrides: DisplayOverrides,
    ) -> Result<(), HostError> {
        let node = self
            .scene
            .node_mut(instance)
            .ok_or(SceneError::UnknownNode(instance))?;
        node.overrides = overrides;
        Ok(())
    }
}

/// Controleer of `id` een transform is met een curve eronder.
#[must_use]
pub fn is_curve_bearing(scene: &Scene, id: NodeId) -> bool {
    matches!(
        scene.node(id).map(|node| &node.kind),
        Some(NodeKind::Transform { .. })
    ) && scene.curve_shape(id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Line3, Point3, Quaternion, Tolerance};
    use crate::instancing::{DisplayType, Reconciler, SlotIndex};
    use crate::scene::{MeshShape, WatchId};

    fn setup() -> (Scene, NodeId, NodeId, NodeId) {
        let mut scene = Scene::new();
        let geometry =
            CurveGeometry::Line(Line3::new(Point3::ORIGIN, Point3::new(0.0, 0.0, 8.0)));
        let (curve, _) = scene.add_shaped("curve#", NodeKind::Curve(geometry), None).unwrap();
        let (cube, cube_shape) = scene
            .add_shaped("cube#", NodeKind::Mesh(MeshShape::unit_cube()), None)
            .unwrap();
        let group = scene
            .add_node(
                "lambert2SG",
                NodeKind::ShadingGroup {
                    members: [cube_shape].into_iter().collect(),
                },
                None,
            )
            .unwrap();
        let instancer = scene
            .add_node("instancer#", NodeKind::Instancer(InstancerParams::default()), None)
            .unwrap();
        scene
            .connect(PlugRef::message(curve), PlugRef::new(instancer, Plug::InputCurve))
            .unwrap();
        scene
            .connect(PlugRef::message(cube), PlugRef::new(instancer, Plug::InputTransform))
            .unwrap();
        (scene, instancer, cube, group)
    }

    #[test]
    fn view_requires_an_instancer() {
        let (mut scene, _, cube, _) = setup();
        let err = InstancerView::new(&mut scene, cube).unwrap_err();
        assert_eq!(err, SceneError::NotAnInstancer(cube));
    }

    #[test]
    fn view_resolves_connected_inputs() {
        use crate::instancing::CurveProvider;

        let (mut scene, instancer, cube, group) = setup();
        let view = InstancerView::new(&mut scene, instancer).unwrap();
        assert_eq!(view.reference_object(), Some(cube));
        assert_eq!(view.shading_group(cube), Some(group));
        let curve = view.input_curve().expect("curve connected");
        assert!((curve.length() - 8.0).abs() < 1e-9);
        assert!(view.occupied_slots().is_empty());
    }

    #[test]
    fn reconciling_through_the_view_builds_instances() {
        let (mut scene, instancer, cube, group) = setup();
        let mut reconciler: Reconciler<WatchId> = Reconciler::new();
        {
            let mut view = InstancerView::new(&mut scene, instancer).unwrap();
            let report = reconciler.tick(&mut view).unwrap();
            assert_eq!(report.created.len(), 5);
        }

        let children = scene.children(instancer);
        assert_eq!(children.len(), 5);
        let cube_shape = scene.node(cube).unwrap().shape();
        let tol = Tolerance::new(1e-6);
        for (k, child) in children.iter().enumerate() {
            let node = scene.node(*child).unwrap();
            assert_eq!(node.shape(), cube_shape);
            assert!(node.overrides.enabled);
            assert_eq!(node.overrides.display_type, DisplayType::Reference);
            assert!(tol.approx_eq_f64(node.transform.translation.z, 1.6 * k as f64));
            assert_eq!(node.transform.rotation, Quaternion::IDENTITY);
            assert_eq!(scene.shading_groups_of(*child), vec![group]);
            assert_eq!(scene.slot_of(instancer, *child), Some(SlotIndex::new(k as u32)));
        }
    }

    #[test]
    fn shrinking_deletes_instance_nodes() {
        let (mut scene, instancer, _, _) = setup();
        let mut reconciler: Reconciler<WatchId> = Reconciler::new();
        reconciler
            .tick(&mut InstancerView::new(&mut scene, instancer).unwrap())
            .unwrap();

        let before = scene.node_count();
        if let Some(params) = scene.node_mut(instancer).and_then(|n| n.instancer_params_mut()) {
            params.set_instance_count(2);
        }
        let report = reconciler
            .tick(&mut InstancerView::new(&mut scene, instancer).unwrap())
            .unwrap();

        assert_eq!(report.removed, vec![SlotIndex::new(4), SlotIndex::new(3), SlotIndex::new(2)]);
        assert_eq!(scene.node_count(), before - 3);
        assert_eq!(scene.children(instancer).len(), 2);
    }
}
