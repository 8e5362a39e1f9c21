//! Sparse slot bookkeeping for managed instances.
//!
//! Slots are logical indices on the instancer's instance list. They stay
//! stable while the population changes, so removals leave holes that later
//! growth fills from the lowest index up.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

use thiserror::Error;

/// Logical index into the instancer's instance list.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct SlotIndex(pub u32);

impl SlotIndex {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inconsistent slot state reported by a host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("slot {0} is occupied twice")]
    DuplicateSlot(SlotIndex),
    #[error("instance {instance} occupies both slot {first} and slot {second}")]
    InstanceInTwoSlots {
        instance: String,
        first: SlotIndex,
        second: SlotIndex,
    },
    #[error("slot index space exhausted")]
    Exhausted,
}

/// Choose `count` free slot indices given the currently occupied ones.
///
/// Holes below the highest occupied index are handed out first, lowest
/// first. The remainder extends past the highest occupied index. The
/// `occupied` slice must be sorted ascending and free of duplicates.
pub fn allocate_slots(occupied: &[SlotIndex], count: usize) -> Result<Vec<SlotIndex>, SlotError> {
    let mut chosen = Vec::with_capacity(count);
    let mut occupied = occupied.iter().map(|slot| slot.0).peekable();
    let mut candidate: u32 = 0;

    while chosen.len() < count {
        match occupied.peek() {
            Some(&taken) if taken == candidate => {
                occupied.next();
            }
            Some(&taken) if taken < candidate => {
                occupied.next();
                continue;
            }
            _ => chosen.push(SlotIndex(candidate)),
        }
        if chosen.len() == count {
            break;
        }
        candidate = candidate.checked_add(1).ok_or(SlotError::Exhausted)?;
    }

    Ok(chosen)
}

/// One managed instance and the slot it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry<H> {
    pub slot: SlotIndex,
    pub instance: H,
}

impl<H> SlotEntry<H> {
    pub const fn new(slot: SlotIndex, instance: H) -> Self {
        Self { slot, instance }
    }
}

/// Occupied slots in physical (connection) order with an index by slot.
#[derive(Debug, Clone)]
pub struct SlotTable<H> {
    entries: Vec<SlotEntry<H>>,
    by_slot: BTreeMap<SlotIndex, usize>,
}

impl<H> Default for SlotTable<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            by_slot: BTreeMap::new(),
        }
    }
}

impl<H: Copy + Eq + Hash + fmt::Debug> SlotTable<H> {
    /// Build a table from entries listed in physical order.
    ///
    /// Fails if a slot is listed twice or an instance occupies more than one
    /// slot.
    pub fn from_entries<I>(entries: I) -> Result<Self, SlotError>
    where
        I: IntoIterator<Item = SlotEntry<H>>,
    {
        let mut table = Self::default();
        let mut seen: HashMap<H, SlotIndex> = HashMap::new();

        for entry in entries {
            if let Some(first) = seen.insert(entry.instance, entry.slot) {
                return Err(SlotError::InstanceInTwoSlots {
                    instance: format!("{:?}", entry.instance),
                    first,
                    second: entry.slot,
                });
            }
            table.insert(entry)?;
        }

        Ok(table)
    }

    /// Append an entry at the end of the physical order.
    pub fn insert(&mut self, entry: SlotEntry<H>) -> Result<(), SlotError> {
        if self.by_slot.contains_key(&entry.slot) {
            return Err(SlotError::DuplicateSlot(entry.slot));
        }
        self.by_slot.insert(entry.slot, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Occupied slot indices, ascending.
    #[must_use]
    pub fn occupied(&self) -> Vec<SlotIndex> {
        self.by_slot.keys().copied().collect()
    }

    /// Entries in physical order.
    pub fn iter(&self) -> impl Iterator<Item = &SlotEntry<H>> {
        self.entries.iter()
    }

    /// Slots for `count` new instances.
    pub fn allocate(&self, count: usize) -> Result<Vec<SlotIndex>, SlotError> {
        allocate_slots(&self.occupied(), count)
    }

    /// The `count` entries with the highest slot indices, highest first.
    #[must_use]
    pub fn highest(&self, count: usize) -> Vec<SlotEntry<H>> {
        self.by_slot
            .iter()
            .rev()
            .take(count)
            .map(|(_, &position)| self.entries[position])
            .collect()
    }
}
