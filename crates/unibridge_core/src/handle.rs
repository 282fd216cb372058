//! Reference-counted handle table shared by both sides of the bridge.
//!
//! A [`Handle`] is an opaque 64-bit id. The low 32 bits select a slot, the
//! high 32 bits carry the slot generation at the time the handle was issued.
//! Freeing a slot bumps its generation, so a stale copy of a freed handle no
//! longer resolves even after the slot has been handed out again.

use std::fmt;

use tracing::warn;

/// Opaque id naming an object owned by one side of the bridge.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handle(u64);

impl Handle {
    /// The reserved "no object" handle.
    pub const NULL: Handle = Handle(0);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    fn pack(index: u32, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(index))
    }

    #[inline]
    fn index(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    #[inline]
    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle(null)")
        } else {
            write!(f, "Handle({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug)]
struct Entry<T> {
    refcount: u32,
    value: T,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Maps handles to reference-counted values.
///
/// An entry exists iff its refcount is at least one. Index 0 is never
/// allocated, so no live handle compares equal to [`Handle::NULL`].
#[derive(Debug)]
pub struct HandleTable<T> {
    // slots[i] backs index i + 1
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxes `value` with a refcount of one. `None` yields the null handle
    /// without allocating.
    pub fn append(&mut self, value: Option<T>) -> Handle {
        match value {
            Some(value) => self.insert(value),
            None => Handle::NULL,
        }
    }

    /// Boxes a value that is known to be present.
    pub fn insert(&mut self, value: T) -> Handle {
        let entry = Some(Entry { refcount: 1, value });
        self.live += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize - 1];
            slot.entry = entry;
            return Handle::pack(index, slot.generation);
        }

        self.slots.push(Slot {
            generation: 0,
            entry,
        });
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        Handle::pack(index, 0)
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        let index = handle.index();
        if index == 0 {
            return None;
        }
        self.slots
            .get(index as usize - 1)
            .filter(|slot| slot.generation == handle.generation())
    }

    fn entry_mut(&mut self, handle: Handle) -> Option<&mut Entry<T>> {
        let index = handle.index();
        if index == 0 {
            return None;
        }
        self.slots
            .get_mut(index as usize - 1)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Resolves a handle. The null handle is silently "no object"; any other
    /// handle that does not resolve is logged as a protocol violation.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        if handle.is_null() {
            return None;
        }
        let value = self
            .slot(handle)
            .and_then(|slot| slot.entry.as_ref())
            .map(|entry| &entry.value);
        if value.is_none() {
            warn!(%handle, "unknown or stale handle");
        }
        value
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if handle.is_null() {
            return None;
        }
        let value = self.entry_mut(handle).map(|entry| &mut entry.value);
        if value.is_none() {
            warn!(%handle, "unknown or stale handle");
        }
        value
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slot(handle)
            .is_some_and(|slot| slot.entry.is_some())
    }

    pub fn refcount(&self, handle: Handle) -> Option<u32> {
        self.slot(handle)
            .and_then(|slot| slot.entry.as_ref())
            .map(|entry| entry.refcount)
    }

    /// Takes another reference to an existing entry and returns the same
    /// handle, or the null handle if there is nothing to clone.
    pub fn clone_ref(&mut self, handle: Handle) -> Handle {
        if handle.is_null() {
            return Handle::NULL;
        }
        match self.entry_mut(handle) {
            Some(entry) if entry.refcount < u32::MAX => {
                entry.refcount += 1;
                handle
            }
            Some(_) => {
                warn!(%handle, "refcount saturated, clone refused");
                Handle::NULL
            }
            None => {
                warn!(%handle, "clone of unknown or stale handle");
                Handle::NULL
            }
        }
    }

    /// Drops one reference. When the last reference goes the entry is
    /// removed, its slot generation advances and the released value is
    /// returned.
    pub fn dispose(&mut self, handle: Handle) -> Option<T> {
        if handle.is_null() {
            return None;
        }
        let Some(entry) = self.entry_mut(handle) else {
            warn!(%handle, "dispose of unknown or stale handle");
            return None;
        };

        entry.refcount -= 1;
        if entry.refcount > 0 {
            return None;
        }

        let index = handle.index();
        let slot = &mut self.slots[index as usize - 1];
        let entry = slot.entry.take()?;
        self.live -= 1;

        // a slot that has issued every generation is retired for good
        if let Some(next) = slot.generation.checked_add(1) {
            slot.generation = next;
            self.free_list.push(index);
        }

        Some(entry.value)
    }

    /// Live handles in slot order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots.iter().enumerate().filter_map(|(pos, slot)| {
            slot.entry.as_ref()?;
            let index = u32::try_from(pos + 1).ok()?;
            Some(Handle::pack(index, slot.generation))
        })
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Drops every entry unconditionally. Only meant for full bridge teardown.
    ///
    /// Generations survive the reset, so handles issued before it stay dead.
    pub fn reset(&mut self) {
        drop(self.drain());
    }

    /// Empties the table like [`reset`](Self::reset) but hands the values
    /// back, so the caller decides where they are dropped.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.live);
        for (pos, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.take() else {
                continue;
            };
            values.push(entry.value);
            if let Some(next) = slot.generation.checked_add(1) {
                slot.generation = next;
                self.free_list.push(u32::try_from(pos + 1).unwrap_or(u32::MAX));
            }
        }
        self.live = 0;
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sentinel() {
        let mut table: HandleTable<String> = HandleTable::new();
        assert_eq!(table.append(None), Handle::NULL);
        assert!(table.get(Handle::NULL).is_none());

        table.insert("x".into());
        assert!(table.get(Handle::NULL).is_none());
        assert!(!table.is_empty());
    }

    #[test]
    fn test_identity_across_clones() {
        let mut table = HandleTable::new();
        let handle = table.insert(42_u32);
        assert_ne!(handle, Handle::NULL);

        for _ in 0..3 {
            assert_eq!(table.clone_ref(handle), handle);
            assert_eq!(table.get(handle), Some(&42));
        }
        assert_eq!(table.refcount(handle), Some(4));
    }

    #[test]
    fn test_refcount_balance() {
        let mut table = HandleTable::new();
        let handle = table.insert("obj");
        let clones = 5;
        for _ in 0..clones {
            table.clone_ref(handle);
        }

        for _ in 0..clones {
            assert!(table.dispose(handle).is_none());
            assert_eq!(table.get(handle), Some(&"obj"));
        }

        assert_eq!(table.dispose(handle), Some("obj"));
        assert!(table.get(handle).is_none());
        assert!(!table.contains(handle));
        assert!(table.is_empty());
    }

    #[test]
    fn test_stale_handle_does_not_alias() {
        let mut table = HandleTable::new();
        let first = table.insert("first");
        table.dispose(first);

        let second = table.insert("second");
        assert_ne!(first, second);
        assert!(table.get(first).is_none());
        assert_eq!(table.get(second), Some(&"second"));

        // stale clone and dispose are no-ops
        assert_eq!(table.clone_ref(first), Handle::NULL);
        assert!(table.dispose(first).is_none());
        assert_eq!(table.refcount(second), Some(1));
    }

    #[test]
    fn test_clone_and_dispose_of_null() {
        let mut table: HandleTable<u8> = HandleTable::new();
        assert_eq!(table.clone_ref(Handle::NULL), Handle::NULL);
        assert!(table.dispose(Handle::NULL).is_none());
        assert!(table.dispose(Handle::from_raw(0xdead_beef)).is_none());
    }

    #[test]
    fn test_slot_reuse_is_lifo() {
        let mut table = HandleTable::new();
        let a = table.insert(1);
        let b = table.insert(2);
        table.dispose(a);
        table.dispose(b);

        let c = table.insert(3);
        assert_eq!(c.index(), b.index());
        assert_eq!(c.generation(), b.generation() + 1);
    }

    #[test]
    fn test_no_premature_reuse_under_churn() {
        // (handle, outstanding references, value)
        let mut live: Vec<(Handle, u32, u64)> = Vec::new();
        let mut retired: Vec<Handle> = Vec::new();
        let mut table = HandleTable::new();
        let mut seed = 0x2545_f491_4f6c_dd1d_u64;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for step in 0..5_000_u64 {
            match next() % 4 {
                0 | 1 => {
                    let handle = table.insert(step);
                    assert!(live.iter().all(|(h, _, _)| *h != handle));
                    assert!(retired.iter().all(|h| *h != handle));
                    live.push((handle, 1, step));
                }
                2 if !live.is_empty() => {
                    let pick = (next() as usize) % live.len();
                    let (handle, refs, _) = &mut live[pick];
                    assert_eq!(table.clone_ref(*handle), *handle);
                    *refs += 1;
                }
                _ if !live.is_empty() => {
                    let pick = (next() as usize) % live.len();
                    let (handle, refs, value) = live[pick];
                    let released = table.dispose(handle);
                    if refs == 1 {
                        assert_eq!(released, Some(value));
                        live.swap_remove(pick);
                        retired.push(handle);
                    } else {
                        assert!(released.is_none());
                        live[pick].1 -= 1;
                    }
                }
                _ => {}
            }

            if step % 500 == 0 {
                for (handle, refs, value) in &live {
                    assert_eq!(table.get(*handle), Some(value));
                    assert_eq!(table.refcount(*handle), Some(*refs));
                }
                for handle in &retired {
                    assert!(!table.contains(*handle));
                }
            }
        }

        assert_eq!(table.len(), live.len());
        assert_eq!(table.handles().count(), live.len());
    }

    #[test]
    fn test_exhausted_slot_is_retired() {
        let mut table = HandleTable::new();
        let handle = table.insert("old");
        table.slots[0].generation = u32::MAX;
        let last = Handle::pack(handle.index(), u32::MAX);

        assert_eq!(table.dispose(last), Some("old"));
        assert!(table.free_list.is_empty());
        for value in ["a", "b", "c"] {
            let fresh = table.insert(value);
            assert_ne!(fresh.index(), handle.index());
        }
        assert!(table.get(last).is_none());

        // reset retires it the same way
        let mut table = HandleTable::new();
        let handle = table.insert(1);
        table.slots[0].generation = u32::MAX;
        table.reset();
        assert_ne!(table.insert(2).index(), handle.index());
    }

    #[test]
    fn test_clone_refused_at_max_refcount() {
        let mut table = HandleTable::new();
        let handle = table.insert(7_u8);
        if let Some(entry) = table.entry_mut(handle) {
            entry.refcount = u32::MAX;
        }

        assert_eq!(table.clone_ref(handle), Handle::NULL);
        assert_eq!(table.refcount(handle), Some(u32::MAX));
        assert_eq!(table.get(handle), Some(&7));
    }

    #[test]
    fn test_reset_drops_everything() {
        let mut table = HandleTable::new();
        let a = table.insert(1);
        table.insert(2);
        table.reset();
        assert!(table.is_empty());
        assert!(table.get(a).is_none());
        assert_eq!(table.handles().count(), 0);

        let b = table.insert(3);
        assert_ne!(a, b);
        assert!(table.get(a).is_none());
        assert_eq!(table.get(b), Some(&3));
    }

    #[test]
    fn test_drain_returns_values() {
        let mut table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        table.clone_ref(b);

        assert_eq!(table.drain(), vec!["a", "b"]);
        assert!(table.is_empty());
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_none());
        assert!(table.drain().is_empty());
    }
}
