//! Capability aggregation across registered interfaces.
//!
//! Every well-known mode declared by a backend is tracked here together with
//! the number of interfaces that declare it. The aggregate interface exposes
//! only the modes every registered backend shares.
//!
//! # Counting
//!
//! A freshly inserted entry starts at `2` and every further owner adds one,
//! so the stored count is always "owners + 1". The entry disappears when the
//! count drops back to `1`. The table also counts the backends that merged
//! into it; together with the aggregate interface that gives the interface
//! count, and an entry is shared exactly when `ref_count == interface_count`.
//! Both counts move under the same lock, so the shared view never sees a
//! backend half merged.
//!
//! A mode listed twice by one backend counts once.

use alloc::vec::Vec;

use spin::Mutex;

use crate::error::{LightsError, LightsResult};
use crate::state::Mode;

/// One aggregated mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityEntry {
    /// The mode as first declared.
    pub mode: Mode,
    /// Number of owners plus one.
    pub ref_count: usize,
}

struct TableInner {
    entries: Vec<CapabilityEntry>,
    /// Backends currently merged, whether or not they declared any mode.
    owners: usize,
}

/// Table of well-known modes declared by registered backends.
pub struct CapabilityTable {
    inner: Mutex<TableInner>,
}

impl CapabilityTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                entries: Vec::new(),
                owners: 0,
            }),
        }
    }

    /// Adds one owner for every well-known mode in `modes`.
    ///
    /// Fails with `Conflict` if a mode reuses a known id under another name.
    /// On any failure the table is left exactly as it was.
    pub fn merge(&self, modes: &[Mode]) -> LightsResult {
        let mut inner = self.inner.lock();
        let entries = &mut inner.entries;
        for (done, mode) in modes.iter().enumerate() {
            if mode.is_custom() || repeats_earlier(modes, done) {
                continue;
            }
            let pos = entries
                .iter()
                .position(|e| e.mode.base_id() == mode.base_id());
            match pos {
                Some(i) if entries[i].mode.name == mode.name => entries[i].ref_count += 1,
                Some(i) => {
                    warn!(
                        "mode {:#04x} declared as '{}', already known as '{}'",
                        mode.base_id(),
                        mode.name(),
                        entries[i].mode.name()
                    );
                    release_locked(entries, &modes[..done]);
                    return Err(LightsError::Conflict);
                }
                None => {
                    if entries.try_reserve(1).is_err() {
                        release_locked(entries, &modes[..done]);
                        return Err(LightsError::OutOfMemory);
                    }
                    entries.push(CapabilityEntry {
                        mode: *mode,
                        ref_count: 2,
                    });
                }
            }
        }
        inner.owners += 1;
        Ok(())
    }

    /// Drops the owner that merged `modes`.
    pub fn release(&self, modes: &[Mode]) {
        let mut inner = self.inner.lock();
        release_locked(&mut inner.entries, modes);
        inner.owners = inner.owners.saturating_sub(1);
    }

    /// Finds an aggregated mode by name.
    pub fn find(&self, name: &str) -> LightsResult<Mode> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| e.mode.name() == name)
            .map(|e| e.mode)
            .ok_or(LightsError::NotFound)
    }

    /// Number of backends merged into the table.
    pub fn owners(&self) -> usize {
        self.inner.lock().owners
    }

    /// Modes owned by every merged backend, in insertion order.
    pub fn shared_snapshot(&self) -> LightsResult<Vec<Mode>> {
        let inner = self.inner.lock();
        // The aggregate interface counts as one.
        let interface_count = inner.owners + 1;
        let mut out = Vec::new();
        out.try_reserve(inner.entries.len())?;
        out.extend(
            inner
                .entries
                .iter()
                .filter(|e| e.ref_count == interface_count)
                .map(|e| e.mode),
        );
        Ok(out)
    }

    /// Copy of every entry, in insertion order.
    pub fn entries(&self) -> Vec<CapabilityEntry> {
        self.inner.lock().entries.clone()
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new()
    }
}

fn repeats_earlier(modes: &[Mode], i: usize) -> bool {
    let mode = &modes[i];
    modes[..i]
        .iter()
        .any(|m| m.base_id() == mode.base_id() && m.name == mode.name)
}

fn release_locked(entries: &mut Vec<CapabilityEntry>, modes: &[Mode]) {
    for (i, mode) in modes.iter().enumerate() {
        if mode.is_custom() || repeats_earlier(modes, i) {
            continue;
        }
        let Some(pos) = entries
            .iter()
            .position(|e| e.mode.base_id() == mode.base_id() && e.mode.name == mode.name)
        else {
            continue;
        };
        entries[pos].ref_count -= 1;
        if entries[pos].ref_count <= 1 {
            entries.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes(names: &[&str]) -> Vec<Mode> {
        names.iter().map(|n| Mode::well_known(n).unwrap()).collect()
    }

    fn names(modes: &[Mode]) -> Vec<&str> {
        modes.iter().map(|m| m.name()).collect()
    }

    #[test]
    fn test_intersection() {
        let table = CapabilityTable::new();
        table.merge(&modes(&["off", "static", "cycle"])).unwrap();
        table.merge(&modes(&["off", "static", "rainbow"])).unwrap();
        table.merge(&modes(&["off", "static"])).unwrap();
        assert_eq!(table.owners(), 3);

        let shared = table.shared_snapshot().unwrap();
        assert_eq!(names(&shared), ["off", "static"]);
    }

    #[test]
    fn test_backend_without_modes_empties_intersection() {
        let table = CapabilityTable::new();
        let a = modes(&["off"]);
        table.merge(&a).unwrap();
        table.merge(&[]).unwrap();
        assert!(table.shared_snapshot().unwrap().is_empty());

        table.release(&[]);
        assert_eq!(names(&table.shared_snapshot().unwrap()), ["off"]);
        table.release(&a);
        assert_eq!(table.owners(), 0);
        assert!(table.shared_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_release_removes_entries() {
        let table = CapabilityTable::new();
        let a = modes(&["off", "static"]);
        let b = modes(&["static"]);
        table.merge(&a).unwrap();
        table.merge(&b).unwrap();
        assert_eq!(table.entries()[1].ref_count, 3);

        table.release(&a);
        let entries = table.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mode.name(), "static");
        assert_eq!(entries[0].ref_count, 2);

        table.release(&b);
        assert!(table.entries().is_empty());
    }

    #[test]
    fn test_repeated_mode_counts_once() {
        let table = CapabilityTable::new();
        let a = modes(&["off", "off", "static"]);
        let b = modes(&["off"]);
        table.merge(&a).unwrap();
        table.merge(&b).unwrap();

        assert_eq!(table.entries()[0].ref_count, 3);
        assert_eq!(names(&table.shared_snapshot().unwrap()), ["off"]);

        table.release(&a);
        let entries = table.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ref_count, 2);
        assert_eq!(names(&table.shared_snapshot().unwrap()), ["off"]);
    }

    #[test]
    fn test_conflict_rolls_back() {
        let table = CapabilityTable::new();
        table.merge(&modes(&["off", "static"])).unwrap();
        let before = table.entries();

        let clash = [
            Mode::well_known("off").unwrap(),
            Mode::well_known("off").unwrap(),
            Mode::well_known("rainbow").unwrap(),
            Mode::new(0x01, "solid").unwrap(),
        ];
        assert_eq!(table.merge(&clash), Err(LightsError::Conflict));
        assert_eq!(table.entries(), before);
        assert_eq!(table.owners(), 1);
    }

    #[test]
    fn test_custom_modes_ignored() {
        let table = CapabilityTable::new();
        let vendor = Mode::custom(0x42, 0x01, "aurora").unwrap();
        table.merge(&[vendor, Mode::off()]).unwrap();
        assert_eq!(table.entries().len(), 1);
        assert_eq!(table.find("aurora"), Err(LightsError::NotFound));
        assert_eq!(table.find("off").unwrap(), Mode::off());
        table.release(&[vendor, Mode::off()]);
        assert!(table.entries().is_empty());
    }
}
