//! Interface registry with node lookup by minor number.
//!
//! This module owns the set of live interfaces and the index from device
//! node identity (minor number) to attribute file:
//! - Name uniqueness among live interfaces
//! - Reference-counted lookup by name, id or minor
//! - Publication of a fully constructed interface in one critical section
//! - Consistent snapshots for broadcast fan-out
//!
//! # Locking
//!
//! A single read-write lock guards the collection. It is never held while a
//! backend callback runs, while another lock is taken, or while an
//! [`InterfaceRef`] is dropped (a drop may run teardown).

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU16, Ordering};

use spin::RwLock;

use crate::attr::AttributeFile;
use crate::error::{LightsError, LightsResult};
use crate::interface::{InterfaceId, InterfaceName, InterfaceRef};
use crate::minor::Minor;

struct NodeEntry {
    interface: InterfaceId,
    file: Arc<AttributeFile>,
}

#[derive(Default)]
struct RegistryInner {
    /// Live interfaces in registration order; each entry is the registry's
    /// own reference.
    interfaces: BTreeMap<InterfaceId, InterfaceRef>,
    names: BTreeMap<InterfaceName, InterfaceId>,
    nodes: BTreeMap<Minor, NodeEntry>,
}

/// Registry of live lighting interfaces.
pub struct InterfaceRegistry {
    inner: RwLock<RegistryInner>,
    /// Counter for generating unique interface IDs.
    next_id: AtomicU16,
}

impl InterfaceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            next_id: AtomicU16::new(0),
        }
    }

    /// Generates an interface ID no live interface is using.
    ///
    /// The counter wraps, so ids of interfaces still in the registry are
    /// skipped. Fails with `Busy` once every id is taken.
    pub fn next_interface_id(&self) -> LightsResult<InterfaceId> {
        for _ in 0..=u16::MAX as usize {
            let id = InterfaceId(self.next_id.fetch_add(1, Ordering::Relaxed));
            if !self.inner.read().interfaces.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(LightsError::Busy)
    }

    /// Number of live interfaces, the aggregate included.
    pub fn len(&self) -> usize {
        self.inner.read().interfaces.len()
    }

    /// Whether no interface is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live interface uses `name`.
    pub fn contains_name(&self, name: &str) -> bool {
        self.inner.read().names.contains_key(name)
    }

    /// ID of the live interface named `name`.
    pub fn id_of(&self, name: &str) -> Option<InterfaceId> {
        self.inner.read().names.get(name).copied()
    }

    /// Makes a fully constructed interface and its files visible.
    ///
    /// The registry takes its own reference; the caller keeps theirs.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the name is taken by a live interface
    /// - `Busy` if the id was handed out again before this publication
    pub fn publish(&self, iface: &InterfaceRef, files: &[Arc<AttributeFile>]) -> LightsResult {
        let mut name = InterfaceName::new();
        name.try_push_str(iface.name())
            .map_err(|_| LightsError::InvalidArgument)?;

        let mut inner = self.inner.write();
        if inner.names.contains_key(&name) {
            return Err(LightsError::AlreadyExists);
        }
        if inner.interfaces.contains_key(&iface.id()) {
            return Err(LightsError::Busy);
        }
        inner.names.insert(name, iface.id());
        inner.interfaces.insert(iface.id(), iface.clone());
        for file in files {
            inner.nodes.insert(
                file.minor(),
                NodeEntry {
                    interface: iface.id(),
                    file: Arc::clone(file),
                },
            );
        }
        Ok(())
    }

    /// Publishes files added to an already registered interface.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the interface was unregistered meanwhile.
    pub fn add_nodes(&self, id: InterfaceId, files: &[Arc<AttributeFile>]) -> LightsResult {
        let mut inner = self.inner.write();
        if !inner.interfaces.contains_key(&id) {
            return Err(LightsError::NotFound);
        }
        for file in files {
            inner.nodes.insert(
                file.minor(),
                NodeEntry {
                    interface: id,
                    file: Arc::clone(file),
                },
            );
        }
        Ok(())
    }

    /// Removes an interface and its nodes from the live set.
    ///
    /// Returns the registry's reference, which the caller must drop after
    /// this call returns.
    pub fn remove(&self, id: InterfaceId) -> LightsResult<InterfaceRef> {
        let mut inner = self.inner.write();
        let iface = inner.interfaces.remove(&id).ok_or(LightsError::NotFound)?;
        inner.names.remove(iface.name());
        inner.nodes.retain(|_, node| node.interface != id);
        Ok(iface)
    }

    /// Looks up a live interface by name, taking a reference.
    pub fn find_by_name(&self, name: &str) -> Option<InterfaceRef> {
        let inner = self.inner.read();
        let id = inner.names.get(name)?;
        inner.interfaces.get(id)?.try_clone()
    }

    /// Looks up a live interface by id, taking a reference.
    pub fn find_by_id(&self, id: InterfaceId) -> Option<InterfaceRef> {
        self.inner.read().interfaces.get(&id)?.try_clone()
    }

    /// Looks up the file behind a device node, taking a reference on its
    /// interface.
    pub fn find_node(&self, minor: Minor) -> Option<(InterfaceRef, Arc<AttributeFile>)> {
        let inner = self.inner.read();
        let node = inner.nodes.get(&minor)?;
        let iface = inner.interfaces.get(&node.interface)?.try_clone()?;
        Some((iface, Arc::clone(&node.file)))
    }

    /// Takes a reference on every live interface except `skip`.
    ///
    /// `out` must come in empty with capacity for the whole registry. Returns
    /// `false` without touching `out` if the registry outgrew it, so that
    /// nothing is allocated under the lock.
    pub fn snapshot_into(&self, out: &mut Vec<InterfaceRef>, skip: InterfaceId) -> bool {
        let inner = self.inner.read();
        if inner.interfaces.len() > out.capacity() {
            return false;
        }
        out.extend(
            inner
                .interfaces
                .iter()
                .filter(|(id, _)| **id != skip)
                .filter_map(|(_, iface)| iface.try_clone()),
        );
        true
    }

    /// IDs of all live interfaces in registration order.
    pub fn ids(&self) -> Vec<InterfaceId> {
        self.inner.read().interfaces.keys().copied().collect()
    }

    /// Number of published device nodes.
    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{Attribute, IoKind};
    use crate::interface::{Interface, Shared, interface_name};

    fn make(registry: &InterfaceRegistry, shared: &Arc<Shared>, name: &str) -> InterfaceRef {
        let iface = Interface::create(
            registry.next_interface_id().unwrap(),
            interface_name(name).unwrap(),
            alloc::vec![],
            0,
            false,
            Arc::clone(shared),
        )
        .unwrap();
        let files = iface
            .create_files(&[Attribute::new(IoKind::Color).with_write(|_| Ok(()))])
            .unwrap();
        registry.publish(&iface, &files).unwrap();
        iface
    }

    #[test]
    fn test_registry_publish_and_lookup() {
        let shared = Arc::new(Shared::new());
        let registry = InterfaceRegistry::new();
        let iface = make(&registry, &shared, "gpu0");
        assert_eq!(registry.len(), 1);
        assert_eq!(iface.ref_count(), 2);

        let found = registry.find_by_name("gpu0").unwrap();
        assert_eq!(found.id(), iface.id());
        assert_eq!(iface.ref_count(), 3);
        drop(found);

        let minor = iface.find_file(IoKind::Color).unwrap().minor();
        let (owner, file) = registry.find_node(minor).unwrap();
        assert_eq!(owner.id(), iface.id());
        assert_eq!(file.kind(), IoKind::Color);
        assert!(registry.find_node(Minor(99)).is_none());
    }

    #[test]
    fn test_registry_duplicate_name() {
        let shared = Arc::new(Shared::new());
        let registry = InterfaceRegistry::new();
        let _first = make(&registry, &shared, "gpu0");

        let dup = Interface::create(
            registry.next_interface_id().unwrap(),
            interface_name("gpu0").unwrap(),
            alloc::vec![],
            0,
            false,
            Arc::clone(&shared),
        )
        .unwrap();
        assert_eq!(registry.publish(&dup, &[]), Err(LightsError::AlreadyExists));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_removal() {
        let shared = Arc::new(Shared::new());
        let registry = InterfaceRegistry::new();
        let iface = make(&registry, &shared, "usb0");
        let id = iface.id();
        drop(iface);

        let removed = registry.remove(id).unwrap();
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.node_count(), 0);
        assert!(registry.find_by_name("usb0").is_none());
        assert_eq!(shared.minors.in_use(), 1);

        drop(removed);
        assert_eq!(shared.minors.in_use(), 0);
        assert!(registry.remove(id).is_err());
    }

    #[test]
    fn test_snapshot_capacity_check() {
        let shared = Arc::new(Shared::new());
        let registry = InterfaceRegistry::new();
        let a = make(&registry, &shared, "a");
        let _b = make(&registry, &shared, "b");

        let mut small = Vec::with_capacity(1);
        assert!(!registry.snapshot_into(&mut small, a.id()));
        assert!(small.is_empty());

        let mut out = Vec::with_capacity(registry.len());
        assert!(registry.snapshot_into(&mut out, a.id()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "b");
    }

    #[test]
    fn test_interface_id_wrap_skips_live_ids() {
        let shared = Arc::new(Shared::new());
        let registry = InterfaceRegistry::new();
        let first = make(&registry, &shared, "all");
        assert_eq!(first.id(), InterfaceId(0));

        registry.next_id.store(u16::MAX, Ordering::Relaxed);
        let last = make(&registry, &shared, "gpu0");
        assert_eq!(last.id(), InterfaceId(u16::MAX));
        // Id 0 is still live, so the wrapped counter moves past it.
        let wrapped = make(&registry, &shared, "gpu1");
        assert_eq!(wrapped.id(), InterfaceId(1));
        assert_eq!(registry.find_by_name("all").unwrap().id(), InterfaceId(0));
    }

    #[test]
    fn test_publish_rejects_live_id() {
        let shared = Arc::new(Shared::new());
        let registry = InterfaceRegistry::new();
        let live = make(&registry, &shared, "all");

        let clash = Interface::create(
            live.id(),
            interface_name("usb0").unwrap(),
            alloc::vec![],
            0,
            false,
            Arc::clone(&shared),
        )
        .unwrap();
        assert_eq!(registry.publish(&clash, &[]), Err(LightsError::Busy));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_by_name("all").unwrap().name(), "all");
        assert!(registry.find_by_name("usb0").is_none());
    }
}
