use std::fmt;

pub mod preload;
pub mod request;

/// Channel backend shards publish transfer requests on
pub const TRANSFER_REQUEST_CHANNEL: &str = "shard_transfer_requests";

/// Channel destination shards listen on for chunk pre-load commands
pub const PRELOAD_CHANNEL: &str = "shard_preload_chunks";

/// Field separator used by every payload on the bus
pub const FIELD_SEPARATOR: char = '|';

/// A world position as sent by the backend shards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            WireDouble(self.x),
            WireDouble(self.y),
            WireDouble(self.z)
        )
    }
}

/// Renders a double the way the backend shards do, so payloads we emit are
/// byte-identical to theirs.
///
/// Plain notation with at least one fractional digit inside `[1e-3, 1e7)`,
/// `<mantissa>E<exponent>` outside of it.
pub struct WireDouble(pub f64);

impl fmt::Display for WireDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;
        if value.is_nan() {
            return f.write_str("NaN");
        }
        if value.is_infinite() {
            return f.write_str(if value > 0.0 { "Infinity" } else { "-Infinity" });
        }

        let magnitude = value.abs();
        if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
            let plain = value.to_string();
            if plain.contains('.') {
                f.write_str(&plain)
            } else {
                write!(f, "{}.0", plain)
            }
        } else {
            let scientific = format!("{:e}", value);
            let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
            if mantissa.contains('.') {
                write!(f, "{}E{}", mantissa, exponent)
            } else {
                write!(f, "{}.0E{}", mantissa, exponent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(value: f64) -> String {
        WireDouble(value).to_string()
    }

    #[test]
    fn whole_numbers_keep_a_fraction_digit() {
        assert_eq!(wire(10.0), "10.0");
        assert_eq!(wire(-3.0), "-3.0");
        assert_eq!(wire(0.0), "0.0");
        assert_eq!(wire(-0.0), "-0.0");
    }

    #[test]
    fn fractions_are_shortest_form() {
        assert_eq!(wire(64.5), "64.5");
        assert_eq!(wire(0.001), "0.001");
        assert_eq!(wire(-1234.125), "-1234.125");
    }

    #[test]
    fn large_and_tiny_values_use_exponent_form() {
        assert_eq!(wire(1e7), "1.0E7");
        assert_eq!(wire(12345678.0), "1.2345678E7");
        assert_eq!(wire(0.0001), "1.0E-4");
        assert_eq!(wire(-2.5e-5), "-2.5E-5");
    }

    #[test]
    fn non_finite_values() {
        assert_eq!(wire(f64::NAN), "NaN");
        assert_eq!(wire(f64::INFINITY), "Infinity");
        assert_eq!(wire(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn position_display() {
        assert_eq!(
            Position::new(10.0, 64.0, -3.0).to_string(),
            "(10.0, 64.0, -3.0)"
        );
    }
}
