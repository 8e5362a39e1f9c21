//! Dirty tracking for one instancer.
//!
//! The notifier owns the watches placed on the connected curve and turns
//! incoming change signals into a pending reposition and, for display
//! parameters, a pending override broadcast.

use super::host::WatchRegistry;
use super::params::ParamKind;

/// What changed upstream of an instancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Control points or other geometry of the curve shape.
    CurveShape,
    /// Transform of the curve or one of its ancestors.
    CurveTransform,
    /// A parameter on the instancer itself.
    Parameter(ParamKind),
    /// An input connection was made or broken.
    Connection,
}

#[derive(Debug, Clone)]
pub struct ChangeNotifier<Id> {
    dirty: bool,
    overrides_pending: bool,
    watches: Vec<Id>,
}

impl<Id> Default for ChangeNotifier<Id> {
    /// Starts dirty so the first evaluation positions everything.
    fn default() -> Self {
        Self {
            dirty: true,
            overrides_pending: false,
            watches: Vec::new(),
        }
    }
}

impl<Id: Copy + Eq + std::fmt::Debug> ChangeNotifier<Id> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change signal.
    pub fn notify(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Parameter(param) if param.affects_overrides() => {
                self.overrides_pending = true;
                self.dirty = true;
            }
            // Structural parameters are picked up by comparing populations.
            ChangeKind::Parameter(_) => {}
            ChangeKind::CurveShape | ChangeKind::CurveTransform | ChangeKind::Connection => {
                self.dirty = true;
            }
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    #[must_use]
    pub const fn overrides_pending(&self) -> bool {
        self.overrides_pending
    }

    pub fn clear_overrides_pending(&mut self) {
        self.overrides_pending = false;
    }

    /// Active watch ids.
    #[must_use]
    pub fn watches(&self) -> &[Id] {
        &self.watches
    }

    /// Subscribe to every object in `targets`, dropping earlier watches first.
    pub fn curve_connected<R>(
        &mut self,
        registry: &mut R,
        subscriber: R::Subscriber,
        targets: &[R::Target],
    ) where
        R: WatchRegistry<WatchId = Id>,
    {
        self.curve_disconnected(registry);
        self.watches = targets
            .iter()
            .map(|&target| registry.watch(target, subscriber))
            .collect();
        log::debug!("curve connected, {} watches installed", self.watches.len());
        self.dirty = true;
    }

    /// Tear down every watch this notifier installed.
    pub fn curve_disconnected<R>(&mut self, registry: &mut R)
    where
        R: WatchRegistry<WatchId = Id>,
    {
        for id in self.watches.drain(..) {
            if !registry.unwatch(id) {
                log::warn!("watch {id:?} was already removed");
            }
        }
    }
}
