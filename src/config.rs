//! Startup defaults for the aggregate interface.

use alloc::string::String;

use crate::attr::{self, IoKind};
use crate::error::LightsError;
use crate::state::{Color, Mode, State, StateType};

/// Startup defaults for the cached global state.
///
/// Values use the same text syntax as writes to the corresponding
/// attribute nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightsConfig {
    /// Name of a well-known mode.
    pub default_mode: String,
    /// `#RRGGBB`, `0xRRGGBB` or `RRGGBB`.
    pub default_color: String,
    /// Digit `0`..`5`.
    pub default_speed: String,
    /// `0` or `1`.
    pub default_direction: String,
}

/// The implemention for LightsConfig
impl LightsConfig {
    /// Creates a configuration from the four default strings.
    pub fn new(mode: &str, color: &str, speed: &str, direction: &str) -> Self {
        Self {
            default_mode: String::from(mode),
            default_color: String::from(color),
            default_speed: String::from(speed),
            default_direction: String::from(direction),
        }
    }

    /// Parses the defaults into a state with mode, color, speed and
    /// direction set.
    ///
    /// A value that fails to parse is reported and replaced by the built-in
    /// default; the others still apply.
    pub fn initial_state(&self) -> State {
        let mut state = State::of(StateType::UPDATE);
        state.mode = Mode::static_color();
        state.color = Color::new(0xff, 0, 0);
        state.speed = 3;
        state.direction = 0;

        let defaults = [
            (IoKind::Mode, &self.default_mode),
            (IoKind::Color, &self.default_color),
            (IoKind::Speed, &self.default_speed),
            (IoKind::Direction, &self.default_direction),
        ];
        for (kind, text) in defaults {
            let parsed = attr::decode(kind, text.as_bytes(), 0, 0, |name| {
                Mode::well_known(name).ok_or(LightsError::NotFound)
            });
            match parsed {
                Ok(value) => state.merge_from(&value),
                Err(err) => warn!(
                    "invalid default {} '{}' ({}), keeping built-in value",
                    kind.default_name(),
                    text,
                    err
                ),
            }
        }
        state
    }
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self::new("static", "#FF0000", "3", "0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let state = LightsConfig::default().initial_state();
        assert_eq!(state.kind, StateType::UPDATE);
        assert_eq!(state.mode, Mode::static_color());
        assert_eq!(state.color, Color::new(0xff, 0, 0));
        assert_eq!(state.speed, 3);
        assert_eq!(state.direction, 0);
    }

    #[test]
    fn test_bad_default_falls_back() {
        let config = LightsConfig::new("sparkle", "0x00ff7f", "9", "1");
        let state = config.initial_state();
        assert_eq!(state.mode, Mode::static_color());
        assert_eq!(state.color, Color::new(0, 0xff, 0x7f));
        assert_eq!(state.speed, 3);
        assert_eq!(state.direction, 1);
    }
}
