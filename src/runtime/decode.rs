//! Payload decoding per entity kind.

use crate::host::EntityState;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// Zone inputs
    Binary,
    Temperature,
    /// Raw passthrough: outputs, keypad lines, version
    Text,
}

impl Decoder {
    /// `None` means "leave the current state unchanged".
    pub fn decode(&self, payload: &str) -> Option<EntityState> {
        match self {
            Decoder::Binary => Some(decode_binary(payload)),
            Decoder::Temperature => decode_temperature(payload).map(EntityState::Number),
            Decoder::Text => Some(EntityState::Text(payload.to_string())),
        }
    }
}

/// Truthy and falsy tokens, trimmed and case-insensitive; anything else is
/// reported as unavailable.
pub fn decode_binary(payload: &str) -> EntityState {
    match payload.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" | "OPEN" | "TRUE" => EntityState::On,
        "0" | "OFF" | "CLOSED" | "FALSE" => EntityState::Off,
        _ => {
            warn!("Unrecognized binary payload {:?}", payload);
            EntityState::Unavailable
        }
    }
}

pub fn decode_temperature(payload: &str) -> Option<f64> {
    match payload.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!("Unparseable temperature payload {:?}", payload);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_tokens() {
        for payload in ["1", "on", " OPEN", "True\n"] {
            assert_eq!(decode_binary(payload), EntityState::On, "{payload:?}");
        }
        for payload in ["0", "OFF", "closed ", "false"] {
            assert_eq!(decode_binary(payload), EntityState::Off, "{payload:?}");
        }
        for payload in ["", "2", "tamper", "yes"] {
            assert_eq!(decode_binary(payload), EntityState::Unavailable, "{payload:?}");
        }
    }

    #[test]
    fn temperature_parsing() {
        assert_eq!(decode_temperature(" 21.5 "), Some(21.5));
        assert_eq!(decode_temperature("-4"), Some(-4.0));
        assert_eq!(decode_temperature("NaN"), None);
        assert_eq!(decode_temperature("21.5C"), None);
    }

    #[test]
    fn text_is_passed_through_untouched() {
        assert_eq!(
            Decoder::Text.decode(" ARMED "),
            Some(EntityState::Text(" ARMED ".to_string()))
        );
        assert_eq!(Decoder::Temperature.decode("x"), None);
    }
}
