//! Threshold policies.
//!
//! Two temperature bands exist side by side and are never merged:
//! `transport` (cold chain in transit) and `live_lab` (the bench sensor
//! feeding `/live-temperature`). Humidity, pressure and tamper limits are
//! shared.

use std::fmt;

use psc_schemas::AlertType;
use serde::{Deserialize, Serialize};

/// Inclusive acceptable range. Values strictly outside raise an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Transport,
    LiveLab,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PolicyKind::Transport => "transport",
            PolicyKind::LiveLab => "live-lab",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub kind: PolicyKind,
    /// °C
    pub temperature: Band,
    /// %
    pub humidity_max: f64,
    /// kPa
    pub pressure: Band,
}

/// One violated dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub alert_type: AlertType,
    pub message: String,
}

impl ThresholdPolicy {
    pub const HUMIDITY_MAX: f64 = 70.0;
    pub const PRESSURE: Band = Band::new(95.0, 105.0);

    pub fn transport() -> Self {
        Self {
            kind: PolicyKind::Transport,
            temperature: Band::new(-10.0, 25.0),
            humidity_max: Self::HUMIDITY_MAX,
            pressure: Self::PRESSURE,
        }
    }

    pub fn live_lab() -> Self {
        Self {
            kind: PolicyKind::LiveLab,
            temperature: Band::new(28.0, 33.0),
            humidity_max: Self::HUMIDITY_MAX,
            pressure: Self::PRESSURE,
        }
    }

    /// Judge a reading in natural units, before any wire rounding, so a
    /// value just past a limit (70.4 %) still alerts.
    ///
    /// Returns one violation per dimension, in alert-type order. Tamper is
    /// reported regardless of the other readings.
    pub fn violations(
        &self,
        celsius: f64,
        humidity: f64,
        pressure: f64,
        tamper_detected: bool,
    ) -> Vec<Violation> {
        let mut out = Vec::new();

        if !self.temperature.contains(celsius) {
            out.push(Violation {
                alert_type: AlertType::Temperature,
                message: format!(
                    "Temperature {celsius}°C outside {} range {:.2}°C to {:.2}°C",
                    self.kind, self.temperature.min, self.temperature.max
                ),
            });
        }

        if humidity > self.humidity_max {
            out.push(Violation {
                alert_type: AlertType::Humidity,
                message: format!(
                    "Humidity {humidity}% exceeds {:.0}%",
                    self.humidity_max
                ),
            });
        }

        if !self.pressure.contains(pressure) {
            out.push(Violation {
                alert_type: AlertType::Pressure,
                message: format!(
                    "Pressure {pressure} kPa outside {:.0} to {:.0} kPa",
                    self.pressure.min, self.pressure.max
                ),
            });
        }

        if tamper_detected {
            out.push(Violation {
                alert_type: AlertType::Tampering,
                message: "Tampering detected on package seal".to_string(),
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_alerts(p: &ThresholdPolicy, celsius: f64) -> usize {
        p.violations(celsius, 50.0, 101.0, false)
            .iter()
            .filter(|v| v.alert_type == AlertType::Temperature)
            .count()
    }

    #[test]
    fn transport_band() {
        let p = ThresholdPolicy::transport();
        assert_eq!(temp_alerts(&p, -12.0), 1);
        assert_eq!(temp_alerts(&p, 27.0), 1);
        assert_eq!(temp_alerts(&p, 20.0), 0);
        assert_eq!(temp_alerts(&p, -10.0), 0);
        assert_eq!(temp_alerts(&p, 25.0), 0);
    }

    #[test]
    fn live_lab_band() {
        let p = ThresholdPolicy::live_lab();
        assert_eq!(temp_alerts(&p, 30.0), 0);
        assert_eq!(temp_alerts(&p, 26.0), 1);
        assert_eq!(temp_alerts(&p, 34.0), 1);
        assert_eq!(temp_alerts(&p, 28.0), 0);
    }

    #[test]
    fn each_dimension_alerts_once() {
        let p = ThresholdPolicy::transport();
        let v = p.violations(30.0, 80.0, 110.0, true);
        let types: Vec<AlertType> = v.iter().map(|x| x.alert_type).collect();
        assert_eq!(
            types,
            vec![
                AlertType::Temperature,
                AlertType::Humidity,
                AlertType::Pressure,
                AlertType::Tampering
            ]
        );
        assert!(v[1].message.contains("80%"));
    }

    #[test]
    fn tamper_alone_still_alerts() {
        let p = ThresholdPolicy::transport();
        let v = p.violations(5.0, 50.0, 101.0, true);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].alert_type, AlertType::Tampering);
    }

    #[test]
    fn humidity_and_pressure_edges() {
        let p = ThresholdPolicy::transport();
        assert!(p.violations(5.0, 70.0, 95.0, false).is_empty());
        assert!(p.violations(5.0, 50.0, 105.0, false).is_empty());
        assert_eq!(p.violations(5.0, 71.0, 105.0, false).len(), 1);
        assert_eq!(p.violations(5.0, 50.0, 94.0, false).len(), 1);
    }

    #[test]
    fn fractional_values_just_past_a_limit_alert() {
        let p = ThresholdPolicy::transport();
        let kinds = |h: f64, kpa: f64| -> Vec<AlertType> {
            p.violations(5.0, h, kpa, false)
                .iter()
                .map(|v| v.alert_type)
                .collect()
        };
        assert_eq!(kinds(70.4, 101.0), vec![AlertType::Humidity]);
        assert_eq!(kinds(50.0, 105.4), vec![AlertType::Pressure]);
        assert_eq!(kinds(50.0, 94.6), vec![AlertType::Pressure]);
        assert!(kinds(69.9, 95.0).is_empty());
        assert_eq!(temp_alerts(&p, 25.004), 1);
    }
}
