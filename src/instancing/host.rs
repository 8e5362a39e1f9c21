//! Seams between the instancing core and the scene that owns the objects.

use std::fmt::Debug;
use std::hash::Hash;

use thiserror::Error;

use super::params::{DisplayOverrides, InstancerParams};
use super::placement::Placement;
use super::sampler::CurveProvider;
use super::slots::{SlotEntry, SlotIndex};

/// Failure reported by the host scene.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("unknown object `{0}`")]
    UnknownObject(String),
    #[error("could not duplicate `{object}`: {reason}")]
    DuplicateFailed { object: String, reason: String },
    #[error("mutation batch rejected: {0}")]
    BatchRejected(String),
    #[error("{0}")]
    Other(String),
}

/// One structural edit inside a [`MutationBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOp<H> {
    /// Attach `instance` to the instance list at `slot`.
    ConnectSlot { instance: H, slot: SlotIndex },
    /// Detach `instance` from `slot`.
    DisconnectSlot { instance: H, slot: SlotIndex },
    /// Delete the instance object itself.
    DeleteObject(H),
}

/// Structural edits committed as a unit: all apply or none do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationBatch<H> {
    ops: Vec<BatchOp<H>>,
}

impl<H> Default for MutationBatch<H> {
    fn default() -> Self {
        Self { ops: Vec::new() }
    }
}

impl<H: Copy> MutationBatch<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, instance: H, slot: SlotIndex) -> &mut Self {
        self.ops.push(BatchOp::ConnectSlot { instance, slot });
        self
    }

    pub fn disconnect(&mut self, instance: H, slot: SlotIndex) -> &mut Self {
        self.ops.push(BatchOp::DisconnectSlot { instance, slot });
        self
    }

    pub fn delete(&mut self, instance: H) -> &mut Self {
        self.ops.push(BatchOp::DeleteObject(instance));
        self
    }

    #[must_use]
    pub fn ops(&self) -> &[BatchOp<H>] {
        &self.ops
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

impl<H> IntoIterator for MutationBatch<H> {
    type Item = BatchOp<H>;
    type IntoIter = std::vec::IntoIter<BatchOp<H>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Read access to one instancer's inputs and managed instances.
pub trait InstancerHost {
    type Handle: Copy + Eq + Hash + Debug;
    type Curve: CurveProvider;
    type Group;

    fn params(&self) -> InstancerParams;

    /// Connected curve, or `None` when zero or several are connected.
    fn input_curve(&self) -> Option<Self::Curve>;

    /// Connected reference object, or `None` when zero or several are connected.
    fn reference_object(&self) -> Option<Self::Handle>;

    /// Occupied slots in physical order.
    fn occupied_slots(&self) -> Vec<SlotEntry<Self::Handle>>;
}

/// Creation and disposal of instance objects.
pub trait InstanceFactory: InstancerHost {
    /// Shading group the reference belongs to, if exactly one.
    fn shading_group(&self, reference: Self::Handle) -> Option<Self::Group>;

    /// Duplicate `reference` under the instancer, sharing its geometry.
    fn spawn_instance(
        &mut self,
        reference: Self::Handle,
        group: Option<&Self::Group>,
        overrides: DisplayOverrides,
    ) -> Result<Self::Handle, HostError>;

    /// Remove an instance that was spawned but never committed.
    fn discard_instance(&mut self, instance: Self::Handle) -> Result<(), HostError>;
}

/// Edits applied to managed instances.
pub trait SceneMutator: InstancerHost {
    /// Apply every op in `batch`, or none of them.
    fn commit(&mut self, batch: MutationBatch<Self::Handle>) -> Result<(), HostError>;

    fn set_placement(
        &mut self,
        instance: Self::Handle,
        placement: &Placement,
    ) -> Result<(), HostError>;

    fn set_display_overrides(
        &mut self,
        instance: Self::Handle,
        overrides: DisplayOverrides,
    ) -> Result<(), HostError>;
}

/// Change subscriptions on scene objects.
pub trait WatchRegistry {
    type Target: Copy;
    type Subscriber: Copy;
    type WatchId: Copy + Eq + Debug;

    fn watch(&mut self, target: Self::Target, subscriber: Self::Subscriber) -> Self::WatchId;

    /// Returns `false` if the watch was already gone.
    fn unwatch(&mut self, id: Self::WatchId) -> bool;
}
