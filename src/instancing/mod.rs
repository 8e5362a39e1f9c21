//! Scene-independent instancing core.
//!
//! Everything here talks to the scene through the traits in [`host`], so the
//! same reconciliation logic runs against the bundled [`crate::scene`] or any
//! other host that can duplicate objects and keep connections.

pub mod host;
pub mod notify;
pub mod overrides;
pub mod params;
pub mod placement;
pub mod reconciler;
pub mod sampler;
pub mod slots;
pub mod target;

pub use host::{
    BatchOp, HostError, InstanceFactory, InstancerHost, MutationBatch, SceneMutator,
    WatchRegistry,
};
pub use notify::{ChangeKind, ChangeNotifier};
pub use overrides::propagate_overrides;
pub use params::{
    DisplayOverrides, DisplayType, InstancerParams, InstancingMode, ParamError, ParamKind,
    ParamValue,
};
pub use placement::{FORWARD_AXIS, Placement, compute_placements, placement_at, placement_fraction};
pub use reconciler::{Reconciler, SkipReason, SyncState, TickError, TickReport};
pub use sampler::{CurveFrame, CurveProvider, WorldCurve};
pub use slots::{SlotEntry, SlotError, SlotIndex, SlotTable, allocate_slots};
pub use target::resolve_target_count;
