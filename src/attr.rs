//! Attribute files and their per-type wire encoding.
//!
//! A backend describes each attribute with an [`Attribute`]: an IO type plus
//! the read/write closures that talk to the hardware. Registration turns it
//! into an [`AttributeFile`] bound to one minor number. Client bytes are
//! decoded into a [`State`] restricted to the attribute's type before the
//! write closure sees them, and reads are encoded back from a `State` the
//! read closure fills in.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use arrayvec::ArrayString;

use crate::codec;
use crate::error::{LightsError, LightsResult};
use crate::interface::InterfaceId;
use crate::minor::Minor;
use crate::state::{Color, Mode, State, StateType, decode_update_blob};

/// Maximum length of an attribute name in bytes.
pub const LIGHTS_MAX_ATTR_NAME_LEN: usize = 32;

/// Inline storage for an attribute name.
pub type AttrName = ArrayString<LIGHTS_MAX_ATTR_NAME_LEN>;

/// Backend read callback. `state.kind` selects what to fill in.
pub type ReadFn = Arc<dyn Fn(&mut State) -> LightsResult + Send + Sync>;

/// Backend write callback. Only the fields in `state.kind` are valid.
pub type WriteFn = Arc<dyn Fn(&State) -> LightsResult + Send + Sync>;

/// IO type of an attribute file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IoKind {
    /// Effect mode, by name.
    Mode,
    /// Primary color, as hex.
    Color,
    /// Effect speed digit.
    Speed,
    /// Effect direction digit.
    Direction,
    /// Write-only sync byte.
    Sync,
    /// Backend-defined byte stream.
    Raw,
    /// Write-only per-LED colors.
    Leds,
    /// Write-only batched state blob.
    Update,
}

impl IoKind {
    /// Node name used when the attribute is not explicitly named.
    pub const fn default_name(self) -> &'static str {
        match self {
            IoKind::Mode => "mode",
            IoKind::Color => "color",
            IoKind::Speed => "speed",
            IoKind::Direction => "direction",
            IoKind::Sync => "sync",
            IoKind::Raw => "raw",
            IoKind::Leds => "leds",
            IoKind::Update => "update",
        }
    }

    /// State bits a write to this type may carry.
    pub const fn state_type(self) -> StateType {
        match self {
            IoKind::Mode => StateType::MODE,
            IoKind::Color => StateType::COLOR,
            IoKind::Speed => StateType::SPEED,
            IoKind::Direction => StateType::DIRECTION,
            IoKind::Sync => StateType::SYNC,
            IoKind::Raw => StateType::RAW,
            IoKind::Leds => StateType::LEDS,
            IoKind::Update => StateType::UPDATE,
        }
    }

    /// Whether reads are never possible on this type.
    pub const fn is_write_only(self) -> bool {
        matches!(self, IoKind::Sync | IoKind::Leds | IoKind::Update)
    }
}

#[derive(Clone)]
pub(crate) enum Handler {
    Backend {
        read: Option<ReadFn>,
        write: Option<WriteFn>,
    },
    /// Served by the aggregate interface from the cached global state.
    Aggregate,
}

/// Description of one attribute a backend wants to expose.
///
/// ```rust,ignore
/// let speed = Attribute::new(IoKind::Speed)
///     .with_read(move |state| { state.speed = zone.speed(); Ok(()) })
///     .with_write(move |state| zone.set_speed(state.speed));
/// ```
#[derive(Clone)]
pub struct Attribute {
    kind: IoKind,
    name: AttrName,
    handler: Handler,
}

impl Attribute {
    /// Creates an attribute of `kind` with its default name and no callbacks.
    pub fn new(kind: IoKind) -> Self {
        let mut name = AttrName::new();
        name.push_str(kind.default_name());
        Self {
            kind,
            name,
            handler: Handler::Backend {
                read: None,
                write: None,
            },
        }
    }

    /// Creates a raw attribute exposed under `name`.
    pub fn raw(name: &str) -> LightsResult<Self> {
        Self::new(IoKind::Raw).named(name)
    }

    pub(crate) fn aggregate(kind: IoKind) -> Self {
        Self {
            handler: Handler::Aggregate,
            ..Self::new(kind)
        }
    }

    /// Renames the attribute node.
    pub fn named(mut self, name: &str) -> LightsResult<Self> {
        if name.is_empty() || name.contains('/') {
            return Err(LightsError::InvalidArgument);
        }
        self.name = AttrName::from(name).map_err(|_| LightsError::InvalidArgument)?;
        Ok(self)
    }

    /// Sets the read callback.
    pub fn with_read<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut State) -> LightsResult + Send + Sync + 'static,
    {
        if let Handler::Backend { read, .. } = &mut self.handler {
            *read = Some(Arc::new(f));
        }
        self
    }

    /// Sets the write callback.
    pub fn with_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&State) -> LightsResult + Send + Sync + 'static,
    {
        if let Handler::Backend { write, .. } = &mut self.handler {
            *write = Some(Arc::new(f));
        }
        self
    }

    /// IO type.
    #[inline]
    pub fn kind(&self) -> IoKind {
        self.kind
    }

    /// Node name.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Checks that the attribute can be created on an interface.
    pub(crate) fn validate(&self, led_count: u16, aggregate: bool) -> LightsResult {
        match &self.handler {
            Handler::Aggregate if aggregate => Ok(()),
            Handler::Aggregate => Err(LightsError::InvalidArgument),
            Handler::Backend { read, write } => {
                if aggregate || (read.is_none() && write.is_none()) {
                    return Err(LightsError::InvalidArgument);
                }
                if self.kind.is_write_only() && read.is_some() {
                    return Err(LightsError::InvalidArgument);
                }
                if self.kind == IoKind::Leds && led_count == 0 {
                    return Err(LightsError::InvalidArgument);
                }
                Ok(())
            }
        }
    }

    pub(crate) fn into_file(self, minor: Minor, interface: InterfaceId) -> AttributeFile {
        AttributeFile {
            kind: self.kind,
            name: self.name,
            minor,
            interface,
            handler: self.handler,
        }
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

/// One typed device node belonging to an interface.
pub struct AttributeFile {
    kind: IoKind,
    name: AttrName,
    minor: Minor,
    interface: InterfaceId,
    handler: Handler,
}

impl AttributeFile {
    /// IO type.
    #[inline]
    pub fn kind(&self) -> IoKind {
        self.kind
    }

    /// Node name.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Node identity.
    #[inline]
    pub fn minor(&self) -> Minor {
        self.minor
    }

    /// Owning interface.
    #[inline]
    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    /// Whether this node is served from the cached global state.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self.handler, Handler::Aggregate)
    }

    /// Reads through the backend callback into `buf`.
    ///
    /// Text types are encoded whole and sliced at `offset`; raw reads hand
    /// `offset` and `buf.len()` to the backend verbatim.
    pub(crate) fn read(&self, offset: usize, buf: &mut [u8]) -> LightsResult<usize> {
        let Handler::Backend {
            read: Some(read), ..
        } = &self.handler
        else {
            return Err(LightsError::Unsupported);
        };

        let mut state = State::of(self.kind.state_type());
        if self.kind == IoKind::Raw {
            state.offset = offset;
            state.raw.try_reserve_exact(buf.len())?;
            state.raw.resize(buf.len(), 0);
            read(&mut state)?;
            let n = core::cmp::min(state.raw.len(), buf.len());
            buf[..n].copy_from_slice(&state.raw[..n]);
            return Ok(n);
        }

        read(&mut state)?;
        let bytes = encode(self.kind, &state)?;
        Ok(codec::read_from_buffer(&bytes, offset, buf))
    }

    /// Hands a decoded state to the backend write callback.
    pub(crate) fn write(&self, state: &State) -> LightsResult {
        match &self.handler {
            Handler::Backend {
                write: Some(write), ..
            } => write(state),
            _ => Err(LightsError::Unsupported),
        }
    }
}

impl fmt::Debug for AttributeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeFile")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("minor", &self.minor)
            .field("interface", &self.interface)
            .field("aggregate", &self.is_aggregate())
            .finish()
    }
}

/// Encodes the readable part of `state` for a text attribute.
pub fn encode(kind: IoKind, state: &State) -> LightsResult<Vec<u8>> {
    match kind {
        IoKind::Mode => Ok(codec::encode_mode(&state.mode)),
        IoKind::Color => Ok(codec::encode_color(state.color)),
        IoKind::Speed => Ok(codec::encode_digit(state.speed)),
        IoKind::Direction => Ok(codec::encode_digit(state.direction)),
        _ => Err(LightsError::Unsupported),
    }
}

/// Decodes client bytes written to an attribute of `kind`.
///
/// `resolve` maps a mode name to a mode the interface supports; `led_count`
/// fixes the expected length of an LED frame.
pub fn decode<F>(
    kind: IoKind,
    data: &[u8],
    offset: usize,
    led_count: u16,
    resolve: F,
) -> LightsResult<State>
where
    F: Fn(&str) -> LightsResult<Mode>,
{
    let mut state = State::of(kind.state_type());
    match kind {
        IoKind::Mode => {
            let name = codec::mode_name(data)?;
            state.mode = resolve(name)?;
        }
        IoKind::Color => {
            let (color, used) = codec::parse_color(data)?;
            codec::expect_trailing_space(data, used)?;
            state.color = color;
        }
        IoKind::Speed => {
            let (speed, used) = codec::parse_speed(data)?;
            codec::expect_trailing_space(data, used)?;
            state.speed = speed;
        }
        IoKind::Direction => {
            let (direction, used) = codec::parse_direction(data)?;
            codec::expect_trailing_space(data, used)?;
            state.direction = direction;
        }
        IoKind::Sync => {
            let (sync, used) = codec::parse_sync(data)?;
            codec::expect_trailing_space(data, used)?;
            state.sync = sync;
        }
        IoKind::Raw => {
            state.raw.try_reserve_exact(data.len())?;
            state.raw.extend_from_slice(data);
            state.offset = offset;
        }
        IoKind::Leds => {
            if led_count == 0 || data.len() != 3 * led_count as usize {
                return Err(LightsError::InvalidArgument);
            }
            state.leds.try_reserve_exact(led_count as usize)?;
            state.leds.extend(
                data.chunks_exact(3)
                    .map(|rgb| Color::new(rgb[0], rgb[1], rgb[2])),
            );
        }
        IoKind::Update => {
            let request = decode_update_blob(data)?;
            state.kind = request.kind;
            if request.kind.contains(StateType::MODE) {
                state.mode = resolve(request.mode_name.as_str())?;
            }
            state.color = request.color;
            state.speed = request.speed;
            state.direction = request.direction;
        }
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{UPDATE_BLOB_LEN, encode_update_blob};

    fn resolve(name: &str) -> LightsResult<Mode> {
        Mode::well_known(name).ok_or(LightsError::NotFound)
    }

    #[test]
    fn test_validate() {
        let no_callbacks = Attribute::new(IoKind::Mode);
        assert!(no_callbacks.validate(0, false).is_err());

        let readable_sync = Attribute::new(IoKind::Sync).with_read(|_| Ok(()));
        assert!(readable_sync.validate(0, false).is_err());

        let leds = Attribute::new(IoKind::Leds).with_write(|_| Ok(()));
        assert!(leds.validate(0, false).is_err());
        assert!(leds.validate(4, false).is_ok());

        assert!(Attribute::aggregate(IoKind::Mode).validate(0, false).is_err());
        assert!(Attribute::aggregate(IoKind::Mode).validate(0, true).is_ok());
    }

    #[test]
    fn test_named() {
        assert_eq!(Attribute::raw("effect").unwrap().name(), "effect");
        assert!(Attribute::raw("a/b").is_err());
        assert!(Attribute::raw("").is_err());
        assert_eq!(Attribute::new(IoKind::Color).name(), "color");
    }

    #[test]
    fn test_decode_text_types() {
        let s = decode(IoKind::Color, b"#1A2B3C\n", 0, 0, resolve).unwrap();
        assert_eq!(s.kind, StateType::COLOR);
        assert_eq!(s.color, Color::new(0x1a, 0x2b, 0x3c));

        let s = decode(IoKind::Mode, b"rainbow\n", 0, 0, resolve).unwrap();
        assert_eq!(s.mode.name(), "rainbow");
        assert_eq!(
            decode(IoKind::Mode, b"sparkle", 0, 0, resolve),
            Err(LightsError::NotFound)
        );

        assert!(decode(IoKind::Speed, b"35", 0, 0, resolve).is_err());
        assert_eq!(decode(IoKind::Sync, b"0x7f", 0, 0, resolve).unwrap().sync, 0x7f);
    }

    #[test]
    fn test_decode_leds_length() {
        let frame = [1u8, 2, 3, 4, 5, 6];
        let s = decode(IoKind::Leds, &frame, 0, 2, resolve).unwrap();
        assert_eq!(s.leds, [Color::new(1, 2, 3), Color::new(4, 5, 6)]);
        assert!(decode(IoKind::Leds, &frame[..5], 0, 2, resolve).is_err());
        assert!(decode(IoKind::Leds, &frame, 0, 3, resolve).is_err());
    }

    #[test]
    fn test_decode_update() {
        let mut src = State::of(StateType::MODE | StateType::COLOR);
        src.mode = Mode::well_known("cycle").unwrap();
        src.color = Color::new(9, 8, 7);
        let blob = encode_update_blob(&src);
        assert_eq!(blob.len(), UPDATE_BLOB_LEN);

        let s = decode(IoKind::Update, &blob, 0, 0, resolve).unwrap();
        assert_eq!(s.kind, StateType::MODE | StateType::COLOR);
        assert_eq!(s.mode, src.mode);
        assert_eq!(s.color, src.color);
        assert!(s.raw.is_empty());
    }

    #[test]
    fn test_backend_read_write() {
        let file = Attribute::new(IoKind::Speed)
            .with_read(|state| {
                state.speed = 4;
                Ok(())
            })
            .into_file(Minor(7), InterfaceId(1));

        let mut buf = [0u8; 8];
        assert_eq!(file.read(0, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"4\n");
        assert_eq!(file.write(&State::of(StateType::SPEED)), Err(LightsError::Unsupported));
    }

    #[test]
    fn test_raw_read_passthrough() {
        let file = Attribute::raw("effect")
            .unwrap()
            .with_read(|state| {
                let base = state.offset as u8;
                for (i, b) in state.raw.iter_mut().enumerate() {
                    *b = base + i as u8;
                }
                state.raw.truncate(3);
                Ok(())
            })
            .into_file(Minor(0), InterfaceId(1));

        let mut buf = [0u8; 8];
        assert_eq!(file.read(10, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[10u8, 11, 12]);
    }
}
