//! Wire encodings shared with the ledger ABI.
//!
//! - Temperature travels as `round(celsius * 100)` in a signed integer.
//!   Rounding is half-up (toward +inf on ties), matching the sensor gateway.
//! - Humidity and pressure travel as unsigned integers, rounded the same way.
//! - Locations may embed GPS as `"<name>|GPS:<lat>,<lng>"`.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Exact delimiter between a location name and its GPS pair.
pub const GPS_DELIMITER: &str = "|GPS:";

fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Celsius → centi-degrees for the ledger.
pub fn celsius_to_centi(celsius: f64) -> Result<i32, CoreError> {
    if !celsius.is_finite() {
        return Err(CoreError::validation("temperature must be a finite number"));
    }
    let scaled = round_half_up(celsius * 100.0);
    if scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
        return Err(CoreError::validation(format!(
            "temperature {celsius} out of representable range"
        )));
    }
    Ok(scaled as i32)
}

/// Centi-degrees from the ledger → Celsius.
pub fn centi_to_celsius(centi: i32) -> f64 {
    f64::from(centi) / 100.0
}

/// Relative humidity (0..=100 %) → wire integer.
pub fn humidity_to_wire(percent: f64) -> Result<u32, CoreError> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(CoreError::validation(format!(
            "humidity {percent} must be within 0..=100 %"
        )));
    }
    Ok(round_half_up(percent) as u32)
}

/// Pressure (kPa, non-negative) → wire integer.
pub fn pressure_to_wire(kpa: f64) -> Result<u32, CoreError> {
    if !kpa.is_finite() || kpa < 0.0 || kpa > f64::from(u32::MAX) {
        return Err(CoreError::validation(format!(
            "pressure {kpa} must be a non-negative kPa value"
        )));
    }
    Ok(round_half_up(kpa) as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A location name with an optional GPS fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLocation {
    pub name: String,
    pub gps: Option<GeoPoint>,
}

impl SensorLocation {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gps: None,
        }
    }

    pub fn with_gps(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            gps: Some(GeoPoint {
                latitude,
                longitude,
            }),
        }
    }

    /// Encode for the ledger. The GPS suffix is only emitted when a fix exists.
    pub fn encode(&self) -> String {
        match self.gps {
            Some(g) => format!(
                "{}{}{},{}",
                self.name, GPS_DELIMITER, g.latitude, g.longitude
            ),
            None => self.name.clone(),
        }
    }

    /// Decode a ledger location string.
    ///
    /// A malformed GPS suffix is not an error: the whole raw string is kept as
    /// the name so nothing written to the ledger is ever lost on read.
    pub fn parse(raw: &str) -> Self {
        let Some((name, gps)) = raw.split_once(GPS_DELIMITER) else {
            return Self::named(raw);
        };
        let parsed = gps.split_once(',').and_then(|(lat, lng)| {
            let latitude = lat.trim().parse::<f64>().ok()?;
            let longitude = lng.trim().parse::<f64>().ok()?;
            (latitude.is_finite() && longitude.is_finite()).then_some(GeoPoint {
                latitude,
                longitude,
            })
        });
        match parsed {
            Some(g) => Self {
                name: name.to_string(),
                gps: Some(g),
            },
            None => Self::named(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_rounds_half_up() {
        assert_eq!(celsius_to_centi(5.2).unwrap(), 520);
        assert_eq!(celsius_to_centi(28.5).unwrap(), 2850);
        assert_eq!(celsius_to_centi(-12.0).unwrap(), -1200);
        // Tie goes toward +inf, not away from zero.
        assert_eq!(celsius_to_centi(-0.125).unwrap(), -12);
        assert_eq!(centi_to_celsius(-1234), -12.34);
    }

    #[test]
    fn non_finite_temperature_rejected() {
        assert!(celsius_to_centi(f64::NAN).is_err());
        assert!(celsius_to_centi(f64::INFINITY).is_err());
    }

    #[test]
    fn humidity_and_pressure_bounds() {
        assert_eq!(humidity_to_wire(45.4).unwrap(), 45);
        assert!(humidity_to_wire(-15.0).is_err());
        assert!(humidity_to_wire(100.1).is_err());
        assert_eq!(pressure_to_wire(101.5).unwrap(), 102);
        assert!(pressure_to_wire(-1.0).is_err());
    }

    #[test]
    fn location_splits_on_exact_delimiter() {
        let loc = SensorLocation::parse("Warehouse A (New York, NY)|GPS:40.7128,-74.006");
        assert_eq!(loc.name, "Warehouse A (New York, NY)");
        let g = loc.gps.unwrap();
        assert_eq!(g.latitude, 40.7128);
        assert_eq!(g.longitude, -74.006);

        let plain = SensorLocation::parse("Lab|gps:1,2");
        assert_eq!(plain.name, "Lab|gps:1,2");
        assert!(plain.gps.is_none());
    }

    #[test]
    fn malformed_gps_keeps_raw_string() {
        let loc = SensorLocation::parse("Dock|GPS:north,south");
        assert_eq!(loc.name, "Dock|GPS:north,south");
        assert!(loc.gps.is_none());
    }

    #[test]
    fn encode_then_parse_preserves_fix() {
        let loc = SensorLocation::with_gps("Regional Hub", 38.9072, -77.0369);
        assert_eq!(loc.encode(), "Regional Hub|GPS:38.9072,-77.0369");
        assert_eq!(SensorLocation::parse(&loc.encode()), loc);
    }
}
