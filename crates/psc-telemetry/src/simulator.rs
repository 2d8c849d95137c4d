//! Synthetic cold-chain sensor for demos and load.
//!
//! Readings sit in the safe transport range (5 °C ± 2, 40–60 % RH,
//! 100–103 kPa). With probability [`SensorSimulator::anomaly_chance`] one
//! dimension goes out of range instead.

use rand::seq::SliceRandom;
use rand::Rng;

use psc_schemas::wire::SensorLocation;

use crate::SensorInput;

struct Site {
    name: &'static str,
    lat: f64,
    lng: f64,
    city: &'static str,
}

const SITES: &[Site] = &[
    Site { name: "Warehouse A", lat: 40.7128, lng: -74.0060, city: "New York, NY" },
    Site { name: "Transit Hub B", lat: 41.8781, lng: -87.6298, city: "Chicago, IL" },
    Site { name: "Distribution Center C", lat: 34.0522, lng: -118.2437, city: "Los Angeles, CA" },
    Site { name: "Pharmacy D", lat: 37.7749, lng: -122.4194, city: "San Francisco, CA" },
    Site { name: "Supplier Warehouse", lat: 39.9526, lng: -75.1652, city: "Philadelphia, PA" },
    Site { name: "Highway Route 1", lat: 40.0583, lng: -76.3055, city: "Route I-76" },
    Site { name: "Manufacturing Plant", lat: 42.3601, lng: -71.0589, city: "Boston, MA" },
    Site { name: "Quality Control Lab", lat: 42.3736, lng: -71.1097, city: "Cambridge, MA" },
    Site { name: "Highway Route 2", lat: 41.2565, lng: -73.9840, city: "Route I-84" },
    Site { name: "Repackaging Facility", lat: 41.0534, lng: -73.5387, city: "Stamford, CT" },
    Site { name: "Packaging Line", lat: 41.0632, lng: -73.5387, city: "Stamford, CT" },
    Site { name: "Highway Route 3", lat: 40.7589, lng: -73.9851, city: "Route I-95" },
    Site { name: "Distribution Center", lat: 40.7357, lng: -74.1724, city: "Newark, NJ" },
    Site { name: "Regional Hub", lat: 38.9072, lng: -77.0369, city: "Washington, DC" },
    Site { name: "City Route", lat: 39.2904, lng: -76.6122, city: "Baltimore, MD" },
    Site { name: "Local Pharmacy", lat: 39.9612, lng: -82.9988, city: "Columbus, OH" },
];

/// Used for locations not in the site table.
const FALLBACK: Site = Site {
    name: "",
    lat: 40.7128,
    lng: -74.0060,
    city: "Unknown",
};

pub const DEFAULT_ROUTE: [&str; 4] = [
    "Warehouse A",
    "Transit Hub B",
    "Distribution Center C",
    "Pharmacy D",
];

pub struct Stage {
    pub name: &'static str,
    pub locations: &'static [&'static str],
}

/// Supplier-to-pharmacy journey, one stage per custody leg.
pub const JOURNEY: [Stage; 7] = [
    Stage {
        name: "Supplier → Manufacturer",
        locations: &["Supplier Warehouse", "Highway Route 1", "Manufacturing Plant"],
    },
    Stage {
        name: "Manufacturing",
        locations: &["Manufacturing Plant", "Quality Control Lab"],
    },
    Stage {
        name: "Manufacturer → Repackager",
        locations: &["Manufacturing Plant", "Highway Route 2", "Repackaging Facility"],
    },
    Stage {
        name: "Repackaging",
        locations: &["Repackaging Facility", "Packaging Line"],
    },
    Stage {
        name: "Repackager → Distributor",
        locations: &["Repackaging Facility", "Highway Route 3", "Distribution Center"],
    },
    Stage {
        name: "Distribution",
        locations: &["Distribution Center", "Regional Hub"],
    },
    Stage {
        name: "Distributor → Pharmacy",
        locations: &["Regional Hub", "City Route", "Local Pharmacy"],
    },
];

fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}

pub struct SensorSimulator<R> {
    rng: R,
    anomaly_chance: f64,
}

impl<R: Rng> SensorSimulator<R> {
    pub const DEFAULT_ANOMALY_CHANCE: f64 = 0.05;

    pub fn new(rng: R) -> Self {
        Self {
            rng,
            anomaly_chance: Self::DEFAULT_ANOMALY_CHANCE,
        }
    }

    pub fn with_anomaly_chance(mut self, chance: f64) -> Self {
        self.anomaly_chance = chance.clamp(0.0, 1.0);
        self
    }

    pub fn anomaly_chance(&self) -> f64 {
        self.anomaly_chance
    }

    /// Location for `site` with ±0.01° drift, labelled with its city.
    pub fn locate(&mut self, site: &str) -> SensorLocation {
        let base = SITES.iter().find(|s| s.name == site).unwrap_or(&FALLBACK);
        let lat = round_to(base.lat + self.rng.gen_range(-0.01..0.01), 4);
        let lng = round_to(base.lng + self.rng.gen_range(-0.01..0.01), 4);
        SensorLocation::with_gps(format!("{site} ({})", base.city), lat, lng)
    }

    /// One reading at a random stop on `route`. An empty route reads at the
    /// fallback site.
    pub fn reading(&mut self, batch_id: &str, route: &[&str]) -> SensorInput {
        let mut temperature = 5.0 + self.rng.gen_range(-2.0..2.0);
        let mut humidity: f64 = self.rng.gen_range(40.0..60.0);
        let mut pressure: f64 = self.rng.gen_range(100.0..103.0);
        let mut tamper_detected = false;

        if self.rng.gen_bool(self.anomaly_chance) {
            match self.rng.gen_range(0..4) {
                0 => temperature = if self.rng.gen_bool(0.5) { -15.0 } else { 30.0 },
                1 => humidity = self.rng.gen_range(75.0..95.0),
                2 => pressure = if self.rng.gen_bool(0.5) { 90.0 } else { 110.0 },
                _ => tamper_detected = true,
            }
        }

        let site = route.choose(&mut self.rng).copied().unwrap_or("Test Location");
        SensorInput {
            batch_id: batch_id.to_string(),
            location: self.locate(site),
            temperature: round_to(temperature, 2),
            humidity: humidity.round(),
            pressure: pressure.round(),
            tamper_detected,
        }
    }
}
