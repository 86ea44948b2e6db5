//! Lighting state: modes, colors and the tagged state passed to backends.

use alloc::vec::Vec;
use core::fmt;

use arrayvec::ArrayString;
use bitflags::bitflags;

use crate::error::{LightsError, LightsResult};

/// Maximum length of a mode name in bytes.
pub const LIGHTS_MAX_MODENAME_LEN: usize = 32;

/// Highest valid effect speed.
pub const LIGHTS_MAX_SPEED: u8 = 5;

/// Inline storage for a mode name.
pub type ModeName = ArrayString<LIGHTS_MAX_MODENAME_LEN>;

/// Well-known mode enumerants (low byte of [`Mode::id`]).
const WELL_KNOWN_MODES: [(u16, &str); 6] = [
    (0x00, "off"),
    (0x01, "static"),
    (0x02, "breathing"),
    (0x03, "flashing"),
    (0x04, "cycle"),
    (0x05, "rainbow"),
];

/// A named lighting effect.
///
/// The low byte of `id` is a well-known enumerant; a nonzero high byte
/// marks a vendor-custom mode that is private to the declaring backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode {
    /// Mode identifier.
    pub id: u16,
    /// Mode name as shown in `caps` and accepted by `mode` writes.
    pub name: ModeName,
}

impl Mode {
    /// Creates a mode, failing if `name` is empty or too long.
    pub fn new(id: u16, name: &str) -> LightsResult<Self> {
        if name.is_empty() {
            return Err(LightsError::InvalidArgument);
        }
        let name = ModeName::from(name).map_err(|_| LightsError::InvalidArgument)?;
        Ok(Self { id, name })
    }

    /// Creates a vendor-custom mode with the given vendor tag in the high byte.
    pub fn custom(vendor: u8, id: u8, name: &str) -> LightsResult<Self> {
        if vendor == 0 {
            return Err(LightsError::InvalidArgument);
        }
        Self::new(((vendor as u16) << 8) | id as u16, name)
    }

    /// Looks up a well-known mode by name.
    pub fn well_known(name: &str) -> Option<Self> {
        WELL_KNOWN_MODES
            .iter()
            .find(|(_, n)| *n == name)
            .and_then(|(id, n)| Self::new(*id, n).ok())
    }

    /// The "off" mode.
    pub fn off() -> Self {
        Self::well_known("off").unwrap_or_default()
    }

    /// The "static" mode.
    pub fn static_color() -> Self {
        Self::well_known("static").unwrap_or_default()
    }

    /// Low byte of the id.
    #[inline]
    pub fn base_id(&self) -> u8 {
        (self.id & 0xff) as u8
    }

    /// Whether this is a vendor-custom mode.
    #[inline]
    pub fn is_custom(&self) -> bool {
        self.id & 0xff00 != 0
    }

    /// Mode name.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// An RGB color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Creates a color from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Creates a color from its packed `0xRRGGBB` form.
    pub const fn from_packed(value: u32) -> Self {
        Self {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }

    /// Packed `0xRRGGBB` form.
    pub const fn packed(&self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

bitflags! {
    /// Selects which fields of a [`State`] are meaningful.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct StateType: u32 {
        /// `mode` is valid.
        const MODE      = 1 << 0;
        /// `color` is valid.
        const COLOR     = 1 << 1;
        /// `speed` is valid.
        const SPEED     = 1 << 2;
        /// `direction` is valid.
        const DIRECTION = 1 << 3;
        /// `sync` is valid.
        const SYNC      = 1 << 4;
        /// `raw`/`offset` are valid.
        const RAW       = 1 << 5;
        /// `leds` is valid.
        const LEDS      = 1 << 6;

        /// Fields an update write may carry, also the cached global set.
        const UPDATE = Self::MODE.bits() | Self::COLOR.bits()
            | Self::SPEED.bits() | Self::DIRECTION.bits();
    }
}

/// State exchanged with backend callbacks.
///
/// Only the fields selected by `kind` are meaningful. A write callback
/// receives exactly one bit, except for update writes which may carry
/// several of [`StateType::UPDATE`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    /// Valid fields.
    pub kind: StateType,
    /// Effect mode.
    pub mode: Mode,
    /// Primary color.
    pub color: Color,
    /// Effect speed, `0..=LIGHTS_MAX_SPEED`.
    pub speed: u8,
    /// Effect direction, `0` or `1`.
    pub direction: u8,
    /// Sync byte.
    pub sync: u8,
    /// Raw attribute payload.
    pub raw: Vec<u8>,
    /// Raw attribute offset.
    pub offset: usize,
    /// Per-LED colors.
    pub leds: Vec<Color>,
}

impl State {
    /// An empty state selecting `kind`.
    pub fn of(kind: StateType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Copies the fields selected by `other.kind` into `self`.
    pub fn merge_from(&mut self, other: &State) {
        if other.kind.contains(StateType::MODE) {
            self.mode = other.mode;
        }
        if other.kind.contains(StateType::COLOR) {
            self.color = other.color;
        }
        if other.kind.contains(StateType::SPEED) {
            self.speed = other.speed;
        }
        if other.kind.contains(StateType::DIRECTION) {
            self.direction = other.direction;
        }
        if other.kind.contains(StateType::SYNC) {
            self.sync = other.sync;
        }
    }
}

/// Size of an update blob.
pub const UPDATE_BLOB_LEN: usize = 72;

const BLOB_KIND: usize = 0;
const BLOB_MODE_ID: usize = 4;
const BLOB_MODE_NAME: usize = 6;
const BLOB_COLOR: usize = BLOB_MODE_NAME + LIGHTS_MAX_MODENAME_LEN;
const BLOB_SPEED: usize = 42;
const BLOB_DIRECTION: usize = 43;
const BLOB_SYNC: usize = 44;

/// Fields decoded from an update blob, before the mode is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Fields the client set.
    pub kind: StateType,
    /// Requested mode name, empty unless `kind` has [`StateType::MODE`].
    pub mode_name: ModeName,
    /// Requested color.
    pub color: Color,
    /// Requested speed.
    pub speed: u8,
    /// Requested direction.
    pub direction: u8,
}

/// Decodes an update blob.
///
/// The raw buffer pointer, length and offset carried at the tail of the blob
/// are never read.
pub fn decode_update_blob(data: &[u8]) -> LightsResult<UpdateRequest> {
    if data.len() != UPDATE_BLOB_LEN {
        return Err(LightsError::InvalidArgument);
    }

    let kind_bits = u32::from_le_bytes(read_array(data, BLOB_KIND));
    let kind = StateType::from_bits(kind_bits).ok_or(LightsError::InvalidArgument)?;
    if kind.is_empty() || !StateType::UPDATE.contains(kind) {
        return Err(LightsError::InvalidArgument);
    }

    let mut mode_name = ModeName::new();
    if kind.contains(StateType::MODE) {
        let field = &data[BLOB_MODE_NAME..BLOB_MODE_NAME + LIGHTS_MAX_MODENAME_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let name = core::str::from_utf8(&field[..end]).map_err(|_| LightsError::InvalidArgument)?;
        mode_name
            .try_push_str(name)
            .map_err(|_| LightsError::InvalidArgument)?;
    }

    let color = Color::from_packed(u32::from_le_bytes(read_array(data, BLOB_COLOR)));
    let speed = data[BLOB_SPEED];
    let direction = data[BLOB_DIRECTION];
    if kind.contains(StateType::SPEED) && speed > LIGHTS_MAX_SPEED {
        return Err(LightsError::InvalidArgument);
    }
    if kind.contains(StateType::DIRECTION) && direction > 1 {
        return Err(LightsError::InvalidArgument);
    }

    Ok(UpdateRequest {
        kind,
        mode_name,
        color,
        speed,
        direction,
    })
}

/// Encodes the update-compatible part of `state` as an update blob.
///
/// The raw buffer fields are always written as zero.
pub fn encode_update_blob(state: &State) -> [u8; UPDATE_BLOB_LEN] {
    let mut blob = [0u8; UPDATE_BLOB_LEN];
    blob[BLOB_KIND..BLOB_KIND + 4].copy_from_slice(&state.kind.bits().to_le_bytes());
    blob[BLOB_MODE_ID..BLOB_MODE_ID + 2].copy_from_slice(&state.mode.id.to_le_bytes());
    let name = state.mode.name().as_bytes();
    blob[BLOB_MODE_NAME..BLOB_MODE_NAME + name.len()].copy_from_slice(name);
    blob[BLOB_COLOR..BLOB_COLOR + 4].copy_from_slice(&state.color.packed().to_le_bytes());
    blob[BLOB_SPEED] = state.speed;
    blob[BLOB_DIRECTION] = state.direction;
    blob[BLOB_SYNC] = state.sync;
    blob
}

fn read_array<const N: usize>(data: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[at..at + N]);
    out
}
