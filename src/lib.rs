#![no_std]

//! # Lights
//!
//! This crate exposes heterogeneous RGB lighting controllers (GPU
//! controllers, USB ARGB headers, memory-module controllers) through one
//! device/attribute abstraction. It is designed for `no_std` environments
//! and uses the `alloc` crate for dynamic memory allocation.
//!
//! ## Architecture
//!
//! ### Core Infrastructure
//! - [`MinorAllocator`]: Fixed-capacity bitmap of device node identities
//! - [`CapabilityTable`]: Per-mode owner counts and the shared-mode intersection
//! - [`Attribute`] / [`AttributeFile`]: Typed nodes wrapping backend read/write closures
//! - [`InterfaceLifecycle`]: Atomic reference count and state machine (Live/Unregistered/TornDown)
//! - [`InterfaceRegistry`]: Live interfaces, name uniqueness and node lookup
//!
//! ### Aggregate Interface
//! - [`GlobalState`]: Last state written through `lights/all`
//! - [`broadcast::fan_out`]: Replays an aggregate write to every backend
//!
//! ### High-Level API
//! - [`LightsConfig`]: Startup defaults
//! - [`Lights`]: Registration, node I/O and shutdown
//!
//! ## Concurrency
//!
//! Every collection has its own short lock (minor bitmap, registry,
//! per-interface file list, capability table, cached state). No lock is held
//! while a backend callback runs or while another lock is taken. An
//! interface is torn down only after it has been unregistered **and** the
//! last [`InterfaceRef`] is gone, so a backend callback can never outlive
//! the state it captured.
//!
//! ## Examples
//!
//! ### Registering a backend
//!
//! ```rust,ignore
//! use lights::{Attribute, IoKind, Lights, LightsConfig, Mode};
//!
//! let lights = Lights::new(LightsConfig::default())?;
//!
//! let zone = Arc::new(GpuZone::probe(bus)?);
//! let modes = [Mode::off(), Mode::static_color(), Mode::well_known("rainbow").unwrap()];
//! let z = zone.clone();
//! let color = Attribute::new(IoKind::Color)
//!     .with_read({ let z = zone.clone(); move |s| { s.color = z.color()?; Ok(()) } })
//!     .with_write(move |s| z.set_color(s.color));
//!
//! lights.register_device("gpu0", &modes, 0, &[color])?;
//! ```
//!
//! ### Client I/O
//!
//! ```rust,ignore
//! let node = lights.node("all", "color")?;
//! lights.write(node, 0, b"#00FF00\n")?; // every backend's color file
//!
//! let mut buf = [0u8; 16];
//! let n = lights.read(lights.node("gpu0", "color")?, 0, &mut buf)?;
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod attr;
pub mod broadcast;
mod caps;
pub mod codec;
mod config;
mod error;
mod interface;
mod lifecycle;
mod lights;
mod minor;
mod registry;
mod state;

pub use attr::{
    AttrName, Attribute, AttributeFile, IoKind, LIGHTS_MAX_ATTR_NAME_LEN, ReadFn, WriteFn, decode,
    encode,
};
pub use broadcast::{BroadcastReport, GlobalState};
pub use caps::{CapabilityEntry, CapabilityTable};
pub use config::LightsConfig;
pub use error::{LightsError, LightsResult};
pub use interface::{
    AGGREGATE_NAME, Interface, InterfaceId, InterfaceName, InterfaceRef, InterfaceStats,
    LIGHTS_MAX_NAME_LEN, StatsSnapshot,
};
pub use lifecycle::{InterfaceLifecycle, InterfaceState};
pub use lights::{InterfaceHandle, Lights};
pub use minor::{MAX_MINORS, Minor, MinorAllocator};
pub use registry::InterfaceRegistry;
pub use state::{
    Color, LIGHTS_MAX_MODENAME_LEN, LIGHTS_MAX_SPEED, Mode, ModeName, State, StateType,
    UPDATE_BLOB_LEN, UpdateRequest, decode_update_blob, encode_update_blob,
};
