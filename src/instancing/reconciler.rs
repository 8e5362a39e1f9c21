//! Drives one instancer towards its target population.
//!
//! Each tick compares the occupied slots against the resolved target count,
//! grows or shrinks in a single atomic batch, pushes pending display
//! overrides and repositions every instance when something upstream changed.

use thiserror::Error;

use super::host::{HostError, InstanceFactory, MutationBatch, SceneMutator};
use super::notify::{ChangeKind, ChangeNotifier};
use super::overrides::propagate_overrides;
use super::params::DisplayOverrides;
use super::placement::compute_placements;
use super::sampler::CurveProvider;
use super::slots::{SlotError, SlotIndex, SlotTable};
use super::target::resolve_target_count;

#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Slots(#[from] SlotError),
}

/// Relation between the current and the target population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    InSync,
    Growing(usize),
    Shrinking(usize),
}

impl SyncState {
    #[must_use]
    pub const fn between(current: usize, target: usize) -> Self {
        if current < target {
            Self::Growing(target - current)
        } else if current > target {
            Self::Shrinking(current - target)
        } else {
            Self::InSync
        }
    }
}

/// Why a tick left the scene untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingCurve,
    MissingReference,
}

/// Outcome of one reconciliation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub state: SyncState,
    pub target: usize,
    pub created: Vec<SlotIndex>,
    pub removed: Vec<SlotIndex>,
    pub repositioned: usize,
    pub overrides_applied: usize,
    pub skipped: Option<SkipReason>,
}

impl TickReport {
    fn new(state: SyncState, target: usize) -> Self {
        Self {
            state,
            target,
            created: Vec::new(),
            removed: Vec::new(),
            repositioned: 0,
            overrides_applied: 0,
            skipped: None,
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::new(SyncState::InSync, 0)
        }
    }

    /// Whether the tick changed anything in the scene.
    #[must_use]
    pub fn changed_scene(&self) -> bool {
        !self.created.is_empty()
            || !self.removed.is_empty()
            || self.repositioned > 0
            || self.overrides_applied > 0
    }
}

/// Per-instancer runtime state. Durable state lives in the host.
#[derive(Debug, Clone)]
pub struct Reconciler<Id> {
    notifier: ChangeNotifier<Id>,
}

impl<Id: Copy + Eq + std::fmt::Debug> Default for Reconciler<Id> {
    fn default() -> Self {
        Self {
            notifier: ChangeNotifier::new(),
        }
    }
}

impl<Id: Copy + Eq + std::fmt::Debug> Reconciler<Id> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notifier(&self) -> &ChangeNotifier<Id> {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut ChangeNotifier<Id> {
        &mut self.notifier
    }

    pub fn notify(&mut self, kind: ChangeKind) {
        self.notifier.notify(kind);
    }

    /// Run one reconciliation pass against `host`.
    ///
    /// Without a curve or a reference object the pass is skipped and the
    /// scene is left as is. On error the dirty flag stays set so the next
    /// tick retries.
    pub fn tick<H>(&mut self, host: &mut H) -> Result<TickReport, TickError>
    where
        H: InstanceFactory + SceneMutator,
    {
        let Some(curve) = host.input_curve() else {
            log::debug!("no input curve, skipping instancing");
            return Ok(TickReport::skipped(SkipReason::MissingCurve));
        };
        let Some(reference) = host.reference_object() else {
            log::debug!("no reference object, skipping instancing");
            return Ok(TickReport::skipped(SkipReason::MissingReference));
        };

        let params = host.params();
        let table = SlotTable::from_entries(host.occupied_slots())?;
        let target = resolve_target_count(&params, Some(curve.length()));
        let state = SyncState::between(table.len(), target);
        let mut report = TickReport::new(state, target);

        match state {
            SyncState::Growing(delta) => {
                report.created = grow(host, &table, reference, delta, params.overrides())?;
                self.notifier.mark_dirty();
            }
            SyncState::Shrinking(delta) => {
                report.removed = shrink(host, &table, delta)?;
                self.notifier.mark_dirty();
            }
            SyncState::InSync => {}
        }

        let entries = host.occupied_slots();
        if entries.len() != target {
            log::warn!(
                "instance count {} differs from target {target} after reconciliation",
                entries.len()
            );
            self.notifier.mark_dirty();
        }

        if self.notifier.overrides_pending() {
            report.overrides_applied = propagate_overrides(host, params.overrides())?;
            self.notifier.clear_overrides_pending();
        }

        if self.notifier.is_dirty() {
            let placements = compute_placements(&curve, entries.len());
            for (entry, placement) in entries.iter().zip(&placements) {
                host.set_placement(entry.instance, placement)?;
            }
            report.repositioned = entries.len();
            if entries.len() == target {
                self.notifier.clear_dirty();
            }
        }

        Ok(report)
    }
}

fn grow<H>(
    host: &mut H,
    table: &SlotTable<H::Handle>,
    reference: H::Handle,
    delta: usize,
    overrides: DisplayOverrides,
) -> Result<Vec<SlotIndex>, TickError>
where
    H: InstanceFactory + SceneMutator,
{
    let slots = table.allocate(delta)?;
    let group = host.shading_group(reference);
    let mut spawned = Vec::with_capacity(slots.len());
    let mut batch = MutationBatch::new();

    for &slot in &slots {
        match host.spawn_instance(reference, group.as_ref(), overrides) {
            Ok(instance) => {
                spawned.push(instance);
                batch.connect(instance, slot);
            }
            Err(err) => {
                discard_spawned(host, &spawned);
                return Err(err.into());
            }
        }
    }

    let ops = batch.len();
    if let Err(err) = host.commit(batch) {
        discard_spawned(host, &spawned);
        return Err(err.into());
    }

    log::debug!("created {} instances ({ops} ops)", slots.len());
    Ok(slots)
}

fn shrink<H>(
    host: &mut H,
    table: &SlotTable<H::Handle>,
    delta: usize,
) -> Result<Vec<SlotIndex>, TickError>
where
    H: SceneMutator,
{
    let victims = table.highest(delta);
    let mut batch = MutationBatch::new();
    for victim in &victims {
        batch
            .disconnect(victim.instance, victim.slot)
            .delete(victim.instance);
    }
    let ops = batch.len();
    host.commit(batch)?;

    log::debug!("removed {} instances ({ops} ops)", victims.len());
    Ok(victims.iter().map(|victim| victim.slot).collect())
}

fn discard_spawned<H: InstanceFactory>(host: &mut H, spawned: &[H::Handle]) {
    for &instance in spawned {
        if let Err(err) = host.discard_instance(instance) {
            log::warn!("could not discard uncommitted instance {instance:?}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::geom::{Line3, Point3, Quaternion, Tolerance, Transform, Vec3};
    use crate::instancing::host::{BatchOp, InstancerHost};
    use crate::instancing::params::{DisplayType, InstancerParams, InstancingMode, ParamKind};
    use crate::instancing::placement::{FORWARD_AXIS, Placement};
    use crate::instancing::sampler::WorldCurve;
    use crate::instancing::slots::SlotEntry;

    #[derive(Debug, Clone, Default)]
    struct MockInstance {
        placement: Option<Placement>,
        overrides: Option<DisplayOverrides>,
        group: Option<&'static str>,
    }

    #[derive(Debug, Clone)]
    struct MockHost {
        params: InstancerParams,
        curve: Option<WorldCurve<Line3>>,
        reference: Option<u32>,
        instances: BTreeMap<u32, MockInstance>,
        slots: Vec<SlotEntry<u32>>,
        next_id: u32,
        fail_spawn_after: Option<usize>,
        spawned_this_tick: usize,
        fail_commit: bool,
        override_writes: usize,
    }

    impl MockHost {
        fn new(count: i64) -> Self {
            let mut params = InstancerParams::default();
            params.set_instance_count(count);
            let line = Line3::new(Point3::ORIGIN, Point3::new(10.0, 0.0, 0.0));
            Self {
                params,
                curve: Some(WorldCurve::new(line, Transform::identity())),
                reference: Some(0),
                instances: BTreeMap::new(),
                slots: Vec::new(),
                next_id: 100,
                fail_spawn_after: None,
                spawned_this_tick: 0,
                fail_commit: false,
                override_writes: 0,
            }
        }

        fn with_slots(count: i64, slots: &[u32]) -> Self {
            let mut host = Self::new(count);
            for &slot in slots {
                let id = host.next_id;
                host.next_id += 1;
                host.instances.insert(id, MockInstance::default());
                host.slots.push(SlotEntry::new(SlotIndex(slot), id));
            }
            host
        }

        fn occupied(&self) -> Vec<u32> {
            let mut slots: Vec<u32> = self.slots.iter().map(|e| e.slot.0).collect();
            slots.sort_unstable();
            slots
        }
    }

    impl InstancerHost for MockHost {
        type Handle = u32;
        type Curve = WorldCurve<Line3>;
        type Group = &'static str;

        fn params(&self) -> InstancerParams {
            self.params
        }

        fn input_curve(&self) -> Option<Self::Curve> {
            self.curve.clone()
        }

        fn reference_object(&self) -> Option<u32> {
            self.reference
        }

        fn occupied_slots(&self) -> Vec<SlotEntry<u32>> {
            self.slots.clone()
        }
    }

    impl InstanceFactory for MockHost {
        fn shading_group(&self, _reference: u32) -> Option<&'static str> {
            Some("lambert1SG")
        }

        fn spawn_instance(
            &mut self,
            reference: u32,
            group: Option<&&'static str>,
            overrides: DisplayOverrides,
        ) -> Result<u32, HostError> {
            if self
                .fail_spawn_after
                .is_some_and(|limit| self.spawned_this_tick >= limit)
            {
                return Err(HostError::DuplicateFailed {
                    object: reference.to_string(),
                    reason: "out of memory".into(),
                });
            }
            self.spawned_this_tick += 1;
            let id = self.next_id;
            self.next_id += 1;
            self.instances.insert(
                id,
                MockInstance {
                    placement: None,
                    overrides: Some(overrides),
                    group: group.copied(),
                },
            );
            Ok(id)
        }

        fn discard_instance(&mut self, instance: u32) -> Result<(), HostError> {
            self.instances
                .remove(&instance)
                .map(|_| ())
                .ok_or_else(|| HostError::UnknownObject(instance.to_string()))
        }
    }

    impl SceneMutator for MockHost {
        fn commit(&mut self, batch: MutationBatch<u32>) -> Result<(), HostError> {
            if self.fail_commit {
                return Err(HostError::BatchRejected("locked".into()));
            }
            let mut slots = self.slots.clone();
            let mut instances = self.instances.clone();
            for op in batch {
                match op {
                    BatchOp::ConnectSlot { instance, slot } => {
                        slots.push(SlotEntry::new(slot, instance));
                    }
                    BatchOp::DisconnectSlot { instance, slot } => {
                        let before = slots.len();
                        slots.retain(|e| !(e.instance == instance && e.slot == slot));
                        if slots.len() == before {
                            return Err(HostError::BatchRejected(format!("{instance} not in {slot}")));
                        }
                    }
                    BatchOp::DeleteObject(instance) => {
                        instances
                            .remove(&instance)
                            .ok_or_else(|| HostError::UnknownObject(instance.to_string()))?;
                    }
                }
            }
            self.slots = slots;
            self.instances = instances;
            Ok(())
        }

        fn set_placement(&mut self, instance: u32, placement: &Placement) -> Result<(), HostError> {
            let entry = self
                .instances
                .get_mut(&instance)
                .ok_or_else(|| HostError::UnknownObject(instance.to_string()))?;
            entry.placement = Some(*placement);
            Ok(())
        }

        fn set_display_overrides(
            &mut self,
            instance: u32,
            overrides: DisplayOverrides,
        ) -> Result<(), HostError> {
            let entry = self
                .instances
                .get_mut(&instance)
                .ok_or_else(|| HostError::UnknownObject(instance.to_string()))?;
            entry.overrides = Some(overrides);
            self.override_writes += 1;
            Ok(())
        }
    }

    fn translation_x(host: &MockHost, entry: &SlotEntry<u32>) -> f64 {
        host.instances[&entry.instance]
            .placement
            .expect("placed")
            .translation
            .x
    }

    #[test]
    fn grows_from_empty_and_places_evenly() {
        let mut host = MockHost::new(5);
        let mut reconciler: Reconciler<u32> = Reconciler::new();

        let report = reconciler.tick(&mut host).expect("tick");
        assert_eq!(report.state, SyncState::Growing(5));
        assert_eq!(report.created, (0..5).map(SlotIndex).collect::<Vec<_>>());
        assert_eq!(report.repositioned, 5);
        assert_eq!(host.occupied(), vec![0, 1, 2, 3, 4]);

        let tol = Tolerance::new(1e-6);
        let slots = host.slots.clone();
        for (k, entry) in slots.iter().enumerate() {
            assert!(tol.approx_eq_f64(translation_x(&host, entry), 2.0 * k as f64));
            let instance = &host.instances[&entry.instance];
            assert_eq!(instance.group, Some("lambert1SG"));
            let rotation = instance.placement.expect("placed").rotation;
            assert!(tol.approx_eq_vec3(rotation.rotate_vec(FORWARD_AXIS), Vec3::X));
        }
        assert!(!reconciler.notifier().is_dirty());
    }

    #[test]
    fn second_tick_is_a_no_op() {
        let mut host = MockHost::new(3);
        let mut reconciler: Reconciler<u32> = Reconciler::new();
        reconciler.tick(&mut host).expect("first tick");
        let before = host.slots.clone();

        let report = reconciler.tick(&mut host).expect("second tick");
        assert_eq!(report.state, SyncState::InSync);
        assert!(!report.changed_scene());
        assert_eq!(host.slots, before);
    }

    #[test]
    fn shrinks_highest_slots_first() {
        let mut host = MockHost::with_slots(2, &[0, 3, 1, 7]);
        let mut reconciler: Reconciler<u32> = Reconciler::new();

        let report = reconciler.tick(&mut host).expect("tick");
        assert_eq!(report.state, SyncState::Shrinking(2));
        assert_eq!(report.removed, vec![SlotIndex(7), SlotIndex(3)]);
        assert_eq!(host.occupied(), vec![0, 1]);
        assert_eq!(host.instances.len(), 2);
    }

    #[test]
    fn growth_fills_holes_first() {
        let mut host = MockHost::with_slots(6, &[0, 2, 5]);
        let mut reconciler: Reconciler<u32> = Reconciler::new();

        let report = reconciler.tick(&mut host).expect("tick");
        assert_eq!(report.created, vec![SlotIndex(1), SlotIndex(3), SlotIndex(4)]);
        assert_eq!(host.occupied(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn placement_follows_physical_order() {
        let mut host = MockHost::with_slots(2, &[3, 0]);
        let mut reconciler: Reconciler<u32> = Reconciler::new();
        reconciler.tick(&mut host).expect("tick");

        let slots = host.slots.clone();
        assert_eq!(slots[0].slot, SlotIndex(3));
        let tol = Tolerance::new(1e-6);
        assert!(tol.approx_eq_f64(translation_x(&host, &slots[0]), 0.0));
        assert!(tol.approx_eq_f64(translation_x(&host, &slots[1]), 5.0));
    }

    #[test]
    fn failed_spawn_rolls_back_everything() {
        let mut host = MockHost::with_slots(5, &[0]);
        host.fail_spawn_after = Some(2);
        let mut reconciler: Reconciler<u32> = Reconciler::new();

        let err = reconciler.tick(&mut host).unwrap_err();
        assert!(matches!(err, TickError::Host(HostError::DuplicateFailed { .. })));
        assert_eq!(host.occupied(), vec![0]);
        assert_eq!(host.instances.len(), 1);
        assert!(reconciler.notifier().is_dirty());
    }

    #[test]
    fn rejected_commit_discards_spawned_instances() {
        let mut host = MockHost::new(3);
        host.fail_commit = true;
        let mut reconciler: Reconciler<u32> = Reconciler::new();

        assert!(reconciler.tick(&mut host).is_err());
        assert!(host.slots.is_empty());
        assert!(host.instances.is_empty());

        host.fail_commit = false;
        let report = reconciler.tick(&mut host).expect("retry");
        assert_eq!(report.created.len(), 3);
    }

    #[test]
    fn missing_inputs_leave_scene_untouched() {
        let mut host = MockHost::with_slots(5, &[0, 1]);
        host.reference = None;
        let mut reconciler: Reconciler<u32> = Reconciler::new();

        let report = reconciler.tick(&mut host).expect("tick");
        assert_eq!(report.skipped, Some(SkipReason::MissingReference));
        assert_eq!(host.occupied(), vec![0, 1]);
        assert!(host.instances.values().all(|i| i.placement.is_none()));

        host.reference = Some(0);
        host.curve = None;
        let report = reconciler.tick(&mut host).expect("tick");
        assert_eq!(report.skipped, Some(SkipReason::MissingCurve));
        assert_eq!(host.occupied(), vec![0, 1]);
        assert!(reconciler.notifier().is_dirty());
    }

    #[test]
    fn display_change_reaches_every_instance() {
        let mut host = MockHost::new(4);
        let mut reconciler: Reconciler<u32> = Reconciler::new();
        reconciler.tick(&mut host).expect("tick");
        assert_eq!(host.override_writes, 0);

        host.params.set_display_type(DisplayType::Template);
        reconciler.notify(ChangeKind::Parameter(ParamKind::DisplayType));
        let report = reconciler.tick(&mut host).expect("tick");

        assert_eq!(report.overrides_applied, 4);
        for instance in host.instances.values() {
            let overrides = instance.overrides.expect("overrides");
            assert!(overrides.enabled);
            assert_eq!(overrides.display_type, DisplayType::Template);
        }
    }

    #[test]
    fn distance_mode_tracks_curve_length() {
        let mut host = MockHost::new(0);
        host.params.set_mode(InstancingMode::Distance);
        host.params.set_instance_spacing(2.5).expect("spacing");
        let mut reconciler: Reconciler<u32> = Reconciler::new();

        let report = reconciler.tick(&mut host).expect("tick");
        assert_eq!(report.target, 4);

        let longer = Line3::new(Point3::ORIGIN, Point3::new(20.0, 0.0, 0.0));
        host.curve = Some(WorldCurve::new(longer, Transform::identity()));
        reconciler.notify(ChangeKind::CurveShape);
        let report = reconciler.tick(&mut host).expect("tick");
        assert_eq!(report.target, 8);
        assert_eq!(host.occupied().len(), 8);
    }

    #[test]
    fn curve_edit_repositions_without_structural_change() {
        let mut host = MockHost::new(2);
        let mut reconciler: Reconciler<u32> = Reconciler::new();
        reconciler.tick(&mut host).expect("tick");

        let moved = Transform::from_trs(
            Vec3::new(0.0, 3.0, 0.0),
            Quaternion::IDENTITY,
            Vec3::new(1.0, 1.0, 1.0),
        );
        let line = Line3::new(Point3::ORIGIN, Point3::new(10.0, 0.0, 0.0));
        host.curve = Some(WorldCurve::new(line, moved));
        reconciler.notify(ChangeKind::CurveTransform);

        let report = reconciler.tick(&mut host).expect("tick");
        assert_eq!(report.state, SyncState::InSync);
        assert_eq!(report.repositioned, 2);
        for instance in host.instances.values() {
            let y = instance.placement.expect("placed").translation.y;
            assert!((y - 3.0).abs() < 1e-9);
        }
    }
}
