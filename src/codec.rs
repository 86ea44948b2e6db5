//! Wire encoders and decoders for the text attributes.
//!
//! The decoders are also exported for backends that implement raw attributes
//! with the same syntax. Each returns the decoded value together with the
//! number of input bytes consumed.

use alloc::vec::Vec;

use crate::error::{LightsError, LightsResult};
use crate::state::{Color, LIGHTS_MAX_MODENAME_LEN, LIGHTS_MAX_SPEED, Mode};

/// Length of an encoded color read, including the NUL terminator.
pub const COLOR_READ_LEN: usize = 9;

fn hex_digit(c: u8) -> LightsResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(LightsError::InvalidArgument),
    }
}

fn hex_byte(pair: &[u8]) -> LightsResult<u8> {
    Ok(hex_digit(pair[0])? << 4 | hex_digit(pair[1])?)
}

/// Fails unless everything after `consumed` is whitespace.
pub(crate) fn expect_trailing_space(input: &[u8], consumed: usize) -> LightsResult {
    if input[consumed..].iter().all(u8::is_ascii_whitespace) {
        Ok(())
    } else {
        Err(LightsError::InvalidArgument)
    }
}

/// Parses `#RRGGBB`, `0xRRGGBB` or `RRGGBB`, case-insensitive.
pub fn parse_color(input: &[u8]) -> LightsResult<(Color, usize)> {
    let prefix = match input {
        [b'#', ..] => 1,
        [b'0', b'x' | b'X', ..] => 2,
        _ => 0,
    };
    let digits = input
        .get(prefix..prefix + 6)
        .ok_or(LightsError::InvalidArgument)?;
    let color = Color::new(
        hex_byte(&digits[0..2])?,
        hex_byte(&digits[2..4])?,
        hex_byte(&digits[4..6])?,
    );
    Ok((color, prefix + 6))
}

/// Parses a single speed digit, `'0'..='5'`.
pub fn parse_speed(input: &[u8]) -> LightsResult<(u8, usize)> {
    match input.first() {
        Some(&c @ b'0'..=b'9') if c - b'0' <= LIGHTS_MAX_SPEED => Ok((c - b'0', 1)),
        _ => Err(LightsError::InvalidArgument),
    }
}

/// Parses a direction digit, `'0'` or `'1'`.
pub fn parse_direction(input: &[u8]) -> LightsResult<(u8, usize)> {
    match input.first() {
        Some(b'0') => Ok((0, 1)),
        Some(b'1') => Ok((1, 1)),
        _ => Err(LightsError::InvalidArgument),
    }
}

/// Parses a sync byte written as `0x` followed by two hex digits.
pub fn parse_sync(input: &[u8]) -> LightsResult<(u8, usize)> {
    match input {
        [b'0', b'x' | b'X', hi, lo, ..] => Ok((hex_byte(&[*hi, *lo])?, 4)),
        _ => Err(LightsError::InvalidArgument),
    }
}

/// Extracts a mode name from client bytes, trimming surrounding whitespace.
pub(crate) fn mode_name(input: &[u8]) -> LightsResult<&str> {
    let name = core::str::from_utf8(input)
        .map_err(|_| LightsError::InvalidArgument)?
        .trim();
    if name.is_empty() || name.len() > LIGHTS_MAX_MODENAME_LEN {
        return Err(LightsError::InvalidArgument);
    }
    Ok(name)
}

/// Matches a mode name against `modes`.
///
/// Surrounding whitespace is ignored; the whole input counts as consumed.
pub fn parse_mode(input: &[u8], modes: &[Mode]) -> LightsResult<(Mode, usize)> {
    let mode = find_mode(modes, mode_name(input)?)?;
    Ok((mode, input.len()))
}

/// Finds a mode by exact name.
pub fn find_mode(modes: &[Mode], name: &str) -> LightsResult<Mode> {
    modes
        .iter()
        .find(|m| m.name() == name)
        .copied()
        .ok_or(LightsError::NotFound)
}

/// Encodes a color read: `#RRGGBB\n` plus a NUL terminator.
pub fn encode_color(color: Color) -> Vec<u8> {
    let mut bytes = alloc::format!("{color}\n").into_bytes();
    bytes.push(0);
    bytes
}

/// Encodes a mode read: `<name>\n`.
pub fn encode_mode(mode: &Mode) -> Vec<u8> {
    let mut out = Vec::with_capacity(mode.name().len() + 1);
    out.extend_from_slice(mode.name().as_bytes());
    out.push(b'\n');
    out
}

/// Encodes a single digit read (speed, direction).
pub fn encode_digit(value: u8) -> Vec<u8> {
    alloc::vec![b'0' + value % 10, b'\n']
}

/// Encodes a newline-separated list of mode names.
pub fn encode_caps(modes: &[Mode]) -> alloc::string::String {
    let mut out = alloc::string::String::new();
    for mode in modes {
        out.push_str(mode.name());
        out.push('\n');
    }
    out
}

/// Copies `src[offset..]` into `buf`, returning the number of bytes copied.
pub(crate) fn read_from_buffer(src: &[u8], offset: usize, buf: &mut [u8]) -> usize {
    if offset >= src.len() {
        return 0;
    }
    let n = core::cmp::min(buf.len(), src.len() - offset);
    buf[..n].copy_from_slice(&src[offset..offset + n]);
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_forms() {
        let want = Color::new(0x1a, 0x2b, 0x3c);
        assert_eq!(parse_color(b"#1A2B3C").unwrap(), (want, 7));
        assert_eq!(parse_color(b"0x1a2b3c").unwrap(), (want, 8));
        assert_eq!(parse_color(b"1a2B3c\n").unwrap(), (want, 6));
        assert_eq!(parse_color(b"#1A2B"), Err(LightsError::InvalidArgument));
        assert_eq!(parse_color(b"#1G2B3C"), Err(LightsError::InvalidArgument));
    }

    #[test]
    fn test_parse_digits() {
        assert_eq!(parse_speed(b"5\n").unwrap(), (5, 1));
        assert!(parse_speed(b"6").is_err());
        assert!(parse_speed(b"").is_err());
        assert_eq!(parse_direction(b"1").unwrap(), (1, 1));
        assert!(parse_direction(b"2").is_err());
    }

    #[test]
    fn test_parse_sync() {
        assert_eq!(parse_sync(b"0xA5").unwrap(), (0xa5, 4));
        assert!(parse_sync(b"A5").is_err());
        assert!(parse_sync(b"0xZ1").is_err());
    }

    #[test]
    fn test_parse_mode() {
        let modes = [Mode::off(), Mode::static_color()];
        let (mode, used) = parse_mode(b" static\n", &modes).unwrap();
        assert_eq!(mode, Mode::static_color());
        assert_eq!(used, 8);
        assert_eq!(parse_mode(b"rainbow", &modes), Err(LightsError::NotFound));
        assert_eq!(parse_mode(b"\n", &modes), Err(LightsError::InvalidArgument));
    }

    #[test]
    fn test_encode_color() {
        let out = encode_color(Color::new(0x1a, 0x2b, 0x3c));
        assert_eq!(out.as_slice(), b"#1A2B3C\n\0");
        assert_eq!(out.len(), COLOR_READ_LEN);
    }

    #[test]
    fn test_read_from_buffer_offsets() {
        let mut buf = [0u8; 4];
        assert_eq!(read_from_buffer(b"static\n", 0, &mut buf), 4);
        assert_eq!(&buf, b"stat");
        assert_eq!(read_from_buffer(b"static\n", 4, &mut buf), 3);
        assert_eq!(&buf[..3], b"ic\n");
        assert_eq!(read_from_buffer(b"static\n", 7, &mut buf), 0);
    }
}
