//! Pushes the instancer's display settings onto every managed instance.

use super::host::{HostError, SceneMutator};
use super::params::DisplayOverrides;

/// Apply `overrides` to every occupied slot. Returns the number of instances
/// touched.
pub fn propagate_overrides<H: SceneMutator>(
    host: &mut H,
    overrides: DisplayOverrides,
) -> Result<usize, HostError> {
    let entries = host.occupied_slots();
    for entry in &entries {
        host.set_display_overrides(entry.instance, overrides)?;
    }
    log::debug!(
        "display overrides {:?} applied to {} instances",
        overrides.display_type,
        entries.len()
    );
    Ok(entries.len())
}
