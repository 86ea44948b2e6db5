//! The lighting core object and the client-facing node API.
//!
//! [`Lights`] owns every shared resource: the interface registry, the minor
//! bitmap, the capability table and the cached global state. Backends call
//! [`Lights::register_device`]; device nodes are served by [`Lights::read`]
//! and [`Lights::write`].

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::LightsConfig;
use crate::attr::{self, Attribute, IoKind};
use crate::broadcast::{self, GlobalState};
use crate::caps::CapabilityEntry;
use crate::codec;
use crate::error::{LightsError, LightsResult};
use crate::interface::{
    AGGREGATE_NAME, Interface, InterfaceId, InterfaceName, InterfaceRef, Shared, StatsSnapshot,
    interface_name,
};
use crate::minor::Minor;
use crate::registry::InterfaceRegistry;
use crate::state::{Mode, State};

/// Handle returned by a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceHandle {
    /// Interface id.
    pub id: InterfaceId,
    /// Interface name.
    pub name: InterfaceName,
}

/// The lighting core: registry, capability table, minors and global state.
///
/// Created once when the subsystem starts and shut down explicitly with
/// [`Lights::shutdown`]. Every method may be called concurrently.
pub struct Lights {
    shared: Arc<Shared>,
    registry: InterfaceRegistry,
    global: GlobalState,
    aggregate: InterfaceId,
}

/// The implemention for Lights
impl Lights {
    /// Starts the core and creates the aggregate interface.
    pub fn new(config: LightsConfig) -> LightsResult<Self> {
        let shared = Arc::new(Shared::new());
        let registry = InterfaceRegistry::new();
        let global = GlobalState::new(&config.initial_state());

        let id = registry.next_interface_id()?;
        let iface = Interface::create(
            id,
            interface_name(AGGREGATE_NAME)?,
            Vec::new(),
            0,
            true,
            Arc::clone(&shared),
        )?;
        let attrs = [
            Attribute::aggregate(IoKind::Mode),
            Attribute::aggregate(IoKind::Color),
            Attribute::aggregate(IoKind::Speed),
            Attribute::aggregate(IoKind::Direction),
            Attribute::aggregate(IoKind::Update),
        ];
        let files = iface.create_files(&attrs)?;
        registry.publish(&iface, &files)?;
        drop(iface);

        info!("lights: core started");
        Ok(Self {
            shared,
            registry,
            global,
            aggregate: id,
        })
    }

    /// Registers a backend interface.
    ///
    /// `modes` lists every mode the backend supports; well-known modes are
    /// merged into the shared capability table. One attribute file is created
    /// per entry of `attrs`. The interface becomes visible only once all of
    /// them exist.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if `name` is taken
    /// - `Conflict` if a mode clashes with another backend's declaration
    /// - `Busy` if the minor numbers run out
    /// - `InvalidArgument` for a bad name or attribute
    ///
    /// Nothing of the interface remains after a failure.
    pub fn register_device(
        &self,
        name: &str,
        modes: &[Mode],
        led_count: u16,
        attrs: &[Attribute],
    ) -> LightsResult<InterfaceHandle> {
        let name = interface_name(name)?;
        if self.registry.contains_name(&name) {
            return Err(LightsError::AlreadyExists);
        }

        let mut owned = Vec::new();
        owned.try_reserve_exact(modes.len())?;
        owned.extend_from_slice(modes);

        let id = self.registry.next_interface_id()?;
        // On any error below, dropping `iface` unwinds files and capabilities.
        let iface = Interface::create(id, name, owned, led_count, false, Arc::clone(&self.shared))?;
        let files = iface.create_files(attrs)?;
        self.registry.publish(&iface, &files)?;

        info!(
            "lights/{}: registered with {} files, {} leds",
            name,
            files.len(),
            led_count
        );
        Ok(InterfaceHandle { id, name })
    }

    /// Unregisters the interface named `name`.
    ///
    /// Its nodes disappear immediately; teardown waits for outstanding
    /// references.
    pub fn unregister_device(&self, name: &str) -> LightsResult {
        let id = self.registry.id_of(name).ok_or(LightsError::NotFound)?;
        self.unregister_id(id)
    }

    /// Unregisters the interface behind `handle`.
    pub fn unregister(&self, handle: InterfaceHandle) -> LightsResult {
        self.unregister_id(handle.id)
    }

    fn unregister_id(&self, id: InterfaceId) -> LightsResult {
        if id == self.aggregate {
            return Err(LightsError::PermissionDenied);
        }
        let iface = self.registry.remove(id)?;
        iface.begin_unregister();
        info!(
            "lights/{}: unregistered, {} references outstanding",
            iface.name(),
            iface.ref_count() - 1
        );
        Ok(())
    }

    /// Adds one attribute file to a registered interface.
    pub fn create_file(&self, name: &str, attr: Attribute) -> LightsResult {
        self.create_files(name, core::slice::from_ref(&attr))
    }

    /// Adds attribute files to a registered interface.
    pub fn create_files(&self, name: &str, attrs: &[Attribute]) -> LightsResult {
        let iface = self.registry.find_by_name(name).ok_or(LightsError::NotFound)?;
        if iface.is_aggregate() {
            return Err(LightsError::PermissionDenied);
        }
        let files = iface.create_files(attrs)?;
        self.registry.add_nodes(iface.id(), &files)
    }

    /// Looks up a live interface, keeping it alive while the reference is held.
    pub fn find(&self, name: &str) -> Option<InterfaceRef> {
        self.registry.find_by_name(name)
    }

    /// Snapshot of the cached global state.
    pub fn global_state(&self) -> State {
        self.global.snapshot()
    }

    /// Minor of the node `lights/<interface>/<attribute>`.
    pub fn node(&self, interface: &str, attribute: &str) -> LightsResult<Minor> {
        let iface = self.registry.find_by_name(interface).ok_or(LightsError::NotFound)?;
        iface
            .file_by_name(attribute)
            .map(|f| f.minor())
            .ok_or(LightsError::NotFound)
    }

    /// Reads from a device node into `buf`, returning the bytes copied.
    pub fn read(&self, minor: Minor, offset: usize, buf: &mut [u8]) -> LightsResult<usize> {
        let (iface, file) = self.registry.find_node(minor).ok_or(LightsError::NotFound)?;
        trace!("lights/{}/{}: read at {}", iface.name(), file.name(), offset);

        let result = if file.is_aggregate() {
            attr::encode(file.kind(), &self.global.snapshot())
                .map(|bytes| codec::read_from_buffer(&bytes, offset, buf))
        } else {
            file.read(offset, buf)
        };

        iface.stats().record_read(&result);
        result
    }

    /// Writes client bytes to a device node.
    ///
    /// On success the whole input counts as consumed.
    pub fn write(&self, minor: Minor, offset: usize, data: &[u8]) -> LightsResult<usize> {
        let (iface, file) = self.registry.find_node(minor).ok_or(LightsError::NotFound)?;
        trace!(
            "lights/{}/{}: write {} bytes at {}",
            iface.name(),
            file.name(),
            data.len(),
            offset
        );

        let result = if file.is_aggregate() {
            self.broadcast(file.kind(), data)
        } else {
            attr::decode(file.kind(), data, offset, iface.led_count(), |name| {
                codec::find_mode(iface.modes(), name)
            })
            .and_then(|state| file.write(&state))
        };

        iface.stats().record_write(&result);
        result.map(|()| data.len())
    }

    fn broadcast(&self, kind: IoKind, data: &[u8]) -> LightsResult {
        let state = attr::decode(kind, data, 0, 0, |name| self.resolve_shared_mode(name))?;
        self.global.merge(&state);

        let report = broadcast::fan_out(&self.registry, self.aggregate, kind, &state)?;
        debug!(
            "lights/{}/{}: broadcast delivered to {}, failed on {}",
            AGGREGATE_NAME,
            kind.default_name(),
            report.delivered,
            report.failed
        );
        Ok(())
    }

    fn resolve_shared_mode(&self, name: &str) -> LightsResult<Mode> {
        let shared = self.shared_modes()?;
        codec::find_mode(&shared, name)
    }

    /// Modes every registered backend supports.
    pub fn shared_modes(&self) -> LightsResult<Vec<Mode>> {
        self.shared.caps.shared_snapshot()
    }

    /// The `caps` listing of an interface: one mode name per line.
    ///
    /// The aggregate interface lists only the modes shared by every backend.
    pub fn caps(&self, name: &str) -> LightsResult<String> {
        let iface = self.registry.find_by_name(name).ok_or(LightsError::NotFound)?;
        if iface.is_aggregate() {
            Ok(codec::encode_caps(&self.shared_modes()?))
        } else {
            Ok(codec::encode_caps(iface.modes()))
        }
    }

    /// The `led_count` of an interface, `0` for the aggregate.
    pub fn led_count(&self, name: &str) -> LightsResult<u16> {
        self.registry
            .find_by_name(name)
            .map(|iface| iface.led_count())
            .ok_or(LightsError::NotFound)
    }

    /// Access counters of an interface.
    pub fn stats(&self, name: &str) -> LightsResult<StatsSnapshot> {
        let iface = self.registry.find_by_name(name).ok_or(LightsError::NotFound)?;
        Ok(iface.stats().snapshot())
    }

    /// Number of live interfaces, the aggregate included.
    pub fn interface_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of minors held by attribute files that still exist.
    pub fn minors_in_use(&self) -> usize {
        self.shared.minors.in_use()
    }

    /// Copy of the capability table.
    pub fn capabilities(&self) -> Vec<CapabilityEntry> {
        self.shared.caps.entries()
    }

    /// Unregisters every interface, backends first and the aggregate last.
    pub fn shutdown(self) {
        for id in self.registry.ids() {
            if id != self.aggregate {
                if let Err(err) = self.unregister_id(id) {
                    debug!("lights: interface {:?} already gone: {}", id, err);
                }
            }
        }
        if let Ok(iface) = self.registry.remove(self.aggregate) {
            iface.begin_unregister();
        }

        let held = self.shared.minors.in_use();
        if held > 0 {
            warn!("lights: shut down with {} minors held by referenced interfaces", held);
        } else {
            info!("lights: shut down");
        }
    }
}
