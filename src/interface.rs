//! Interface records with reference-counted lifetime and statistics.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicU64, Ordering};

use arrayvec::ArrayString;
use spin::Mutex;

use crate::attr::{Attribute, AttributeFile, IoKind};
use crate::caps::CapabilityTable;
use crate::error::{LightsError, LightsResult};
use crate::lifecycle::{InterfaceLifecycle, InterfaceState};
use crate::minor::MinorAllocator;
use crate::state::Mode;

/// Maximum length of an interface name in bytes.
pub const LIGHTS_MAX_NAME_LEN: usize = 32;

/// Name of the aggregate interface.
pub const AGGREGATE_NAME: &str = "all";

/// Inline storage for an interface name.
pub type InterfaceName = ArrayString<LIGHTS_MAX_NAME_LEN>;

/// Unique identifier for an interface, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(pub u16);

/// Validates and copies an interface name.
pub(crate) fn interface_name(name: &str) -> LightsResult<InterfaceName> {
    if name.is_empty() || name.contains('/') {
        return Err(LightsError::InvalidArgument);
    }
    InterfaceName::from(name).map_err(|_| LightsError::InvalidArgument)
}

/// Resources an interface gives back when it is torn down.
pub(crate) struct Shared {
    pub minors: MinorAllocator,
    pub caps: CapabilityTable,
}

impl Shared {
    pub const fn new() -> Self {
        Self {
            minors: MinorAllocator::new(),
            caps: CapabilityTable::new(),
        }
    }
}

/// Node access counters of one interface, as reported by [`InterfaceStats::snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Reads served from this interface's nodes.
    pub reads: u64,
    /// Writes accepted by this interface's backend, broadcast deliveries included.
    pub writes: u64,
    /// Reads and writes that failed, whether in decoding or in the backend.
    pub errors: u64,
}

/// Counts client I/O against the nodes of one interface.
///
/// A write through `all` is counted on the aggregate interface and once more
/// on every backend it reaches.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    reads: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

impl InterfaceStats {
    pub(crate) fn record_read<T>(&self, result: &LightsResult<T>) {
        self.bump(&self.reads, result.is_ok());
    }

    pub(crate) fn record_write<T>(&self, result: &LightsResult<T>) {
        self.bump(&self.writes, result.is_ok());
    }

    fn bump(&self, on_success: &AtomicU64, ok: bool) {
        let counter = if ok { on_success } else { &self.errors };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// One named lighting controller and its attribute files.
///
/// Interfaces are only reachable through an [`InterfaceRef`]. The files are
/// destroyed, their minors released and the declared modes dropped from the
/// capability table when the last reference goes away.
pub struct Interface {
    id: InterfaceId,
    name: InterfaceName,
    modes: Vec<Mode>,
    led_count: u16,
    aggregate: bool,
    /// Whether `modes` were merged into the capability table.
    caps_merged: bool,
    /// Attribute files, in creation order.
    files: Mutex<Vec<Arc<AttributeFile>>>,
    lifecycle: InterfaceLifecycle,
    stats: InterfaceStats,
    shared: Arc<Shared>,
}

impl Interface {
    /// Creates an interface holding one reference.
    ///
    /// For backend interfaces this merges `modes` into the capability table;
    /// nothing else has happened yet if that fails.
    pub(crate) fn create(
        id: InterfaceId,
        name: InterfaceName,
        modes: Vec<Mode>,
        led_count: u16,
        aggregate: bool,
        shared: Arc<Shared>,
    ) -> LightsResult<InterfaceRef> {
        if !aggregate {
            shared.caps.merge(&modes)?;
        }
        Ok(InterfaceRef {
            inner: Arc::new(Self {
                id,
                name,
                modes,
                led_count,
                aggregate,
                caps_merged: !aggregate,
                files: Mutex::new(Vec::new()),
                lifecycle: InterfaceLifecycle::new(),
                stats: InterfaceStats::default(),
                shared,
            }),
        })
    }

    /// Gets the interface ID.
    #[inline]
    pub fn id(&self) -> InterfaceId {
        self.id
    }

    /// Gets the interface name.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Modes declared at registration, custom modes included.
    #[inline]
    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    /// Number of individually addressable LEDs.
    #[inline]
    pub fn led_count(&self) -> u16 {
        self.led_count
    }

    /// Whether this is the aggregate interface.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    /// Gets a reference to the statistics.
    #[inline]
    pub fn stats(&self) -> &InterfaceStats {
        &self.stats
    }

    /// Gets the lifecycle state.
    #[inline]
    pub fn state(&self) -> InterfaceState {
        self.lifecycle.state()
    }

    /// Gets the current reference count.
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.lifecycle.ref_count()
    }

    /// Snapshot of the attribute files.
    pub fn files(&self) -> Vec<Arc<AttributeFile>> {
        self.files.lock().clone()
    }

    /// First file of `kind`, if any.
    pub fn find_file(&self, kind: IoKind) -> Option<Arc<AttributeFile>> {
        self.files.lock().iter().find(|f| f.kind() == kind).cloned()
    }

    /// File exposed under `name`, if any.
    pub fn file_by_name(&self, name: &str) -> Option<Arc<AttributeFile>> {
        self.files.lock().iter().find(|f| f.name() == name).cloned()
    }

    /// Creates one file per attribute and appends them to this interface.
    ///
    /// Either every attribute gets a file or none does. The new files are
    /// returned so the caller can publish their nodes.
    pub(crate) fn create_files(&self, attrs: &[Attribute]) -> LightsResult<Vec<Arc<AttributeFile>>> {
        for (i, attr) in attrs.iter().enumerate() {
            attr.validate(self.led_count, self.aggregate)?;
            if attrs[..i].iter().any(|a| a.name() == attr.name()) {
                return Err(LightsError::AlreadyExists);
            }
        }

        let mut created: Vec<Arc<AttributeFile>> = Vec::new();
        created.try_reserve_exact(attrs.len())?;
        for attr in attrs {
            match self.shared.minors.allocate() {
                Ok(minor) => created.push(Arc::new(attr.clone().into_file(minor, self.id))),
                Err(err) => {
                    self.release_minors(&created);
                    return Err(err);
                }
            }
        }

        let mut files = self.files.lock();
        let clash = created
            .iter()
            .any(|new| files.iter().any(|f| f.name() == new.name()));
        if clash || files.try_reserve(created.len()).is_err() {
            drop(files);
            self.release_minors(&created);
            return Err(if clash {
                LightsError::AlreadyExists
            } else {
                LightsError::OutOfMemory
            });
        }
        files.extend(created.iter().cloned());
        drop(files);

        for file in &created {
            debug!(
                "lights/{}/{}: created as minor {}",
                self.name,
                file.name(),
                file.minor()
            );
        }
        Ok(created)
    }

    fn release_minors(&self, files: &[Arc<AttributeFile>]) {
        for file in files {
            if let Err(err) = self.shared.minors.release(file.minor()) {
                error!(
                    "lights/{}/{}: minor {} release failed: {}",
                    self.name,
                    file.name(),
                    file.minor(),
                    err
                );
            }
        }
    }

    /// Destroys the attribute files and returns what the interface held.
    fn teardown(&self) {
        let files = core::mem::take(&mut *self.files.lock());
        self.release_minors(&files);
        if self.caps_merged {
            self.shared.caps.release(&self.modes);
        }
        debug!(
            "lights/{}: torn down, {} files destroyed",
            self.name,
            files.len()
        );
    }

    pub(crate) fn begin_unregister(&self) -> bool {
        self.lifecycle.begin_unregister()
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("led_count", &self.led_count)
            .field("aggregate", &self.aggregate)
            .field("lifecycle", &self.lifecycle)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// A counted reference keeping an [`Interface`] from being torn down.
///
/// Dropping the last reference runs the teardown. Never drop one while
/// holding a registry lock.
pub struct InterfaceRef {
    inner: Arc<Interface>,
}

impl InterfaceRef {
    /// Takes a new reference if the interface is still live.
    pub(crate) fn try_clone(&self) -> Option<Self> {
        self.inner.lifecycle.try_get().then(|| Self {
            inner: Arc::clone(&self.inner),
        })
    }
}

impl Deref for InterfaceRef {
    type Target = Interface;

    fn deref(&self) -> &Interface {
        &self.inner
    }
}

impl Clone for InterfaceRef {
    fn clone(&self) -> Self {
        self.inner.lifecycle.get();
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for InterfaceRef {
    fn drop(&mut self) {
        if self.inner.lifecycle.put() {
            self.inner.teardown();
        }
    }
}

impl fmt::Debug for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;

    fn shared() -> Arc<Shared> {
        Arc::new(Shared::new())
    }

    fn color_attr() -> Attribute {
        Attribute::new(IoKind::Color).with_write(|_: &State| Ok(()))
    }

    #[test]
    fn test_create_files_and_teardown() {
        let shared = shared();
        let modes = alloc::vec![Mode::off(), Mode::static_color()];
        let iface = Interface::create(
            InterfaceId(1),
            interface_name("gpu0").unwrap(),
            modes,
            0,
            false,
            Arc::clone(&shared),
        )
        .unwrap();

        let files = iface
            .create_files(&[color_attr(), Attribute::new(IoKind::Mode).with_write(|_| Ok(()))])
            .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(shared.minors.in_use(), 2);
        assert_eq!(shared.caps.entries().len(), 2);
        assert!(iface.find_file(IoKind::Mode).is_some());

        drop(iface);
        assert_eq!(shared.minors.in_use(), 0);
        assert!(shared.caps.entries().is_empty());
    }

    #[test]
    fn test_create_files_all_or_nothing() {
        let shared = shared();
        let iface = Interface::create(
            InterfaceId(1),
            interface_name("usb0").unwrap(),
            alloc::vec![],
            0,
            false,
            Arc::clone(&shared),
        )
        .unwrap();
        iface.create_files(&[color_attr()]).unwrap();

        // Second color file under the same name.
        let err = iface
            .create_files(&[Attribute::new(IoKind::Speed).with_write(|_| Ok(())), color_attr()])
            .unwrap_err();
        assert_eq!(err, LightsError::AlreadyExists);
        assert_eq!(shared.minors.in_use(), 1);
        assert_eq!(iface.files().len(), 1);
    }

    #[test]
    fn test_teardown_waits_for_last_reference() {
        let shared = shared();
        let iface = Interface::create(
            InterfaceId(3),
            interface_name("dimm0").unwrap(),
            alloc::vec![],
            0,
            false,
            Arc::clone(&shared),
        )
        .unwrap();
        iface.create_files(&[color_attr()]).unwrap();

        let held = iface.try_clone().unwrap();
        assert_eq!(held.ref_count(), 2);
        assert!(iface.begin_unregister());
        assert!(iface.try_clone().is_none());

        drop(iface);
        assert_eq!(held.state(), InterfaceState::Unregistered);
        assert_eq!(shared.minors.in_use(), 1);

        drop(held);
        assert_eq!(shared.minors.in_use(), 0);
    }

    #[test]
    fn test_interface_name_validation() {
        assert!(interface_name("").is_err());
        assert!(interface_name("a/b").is_err());
        assert!(interface_name(&"n".repeat(LIGHTS_MAX_NAME_LEN + 1)).is_err());
        assert_eq!(interface_name("ram0").unwrap().as_str(), "ram0");
    }
}
