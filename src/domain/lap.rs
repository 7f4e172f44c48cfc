// Lap domain models
use super::error::AnalysisError;
use super::telemetry::TelemetryPoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw lap counters above this value carry flag bits in the high half.
const LAP_COUNTER_FLAG_THRESHOLD: i64 = 1000;
const LAP_COUNTER_MASK: i64 = 0x7FFF;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vehicle {
    pub chassis: String,
    pub car_number: u32,
}

impl Vehicle {
    pub fn new(chassis: impl Into<String>, car_number: u32) -> Self {
        Self {
            chassis: chassis.into(),
            car_number,
        }
    }

    /// Parse a logger vehicle id such as `GR86-002-2` into chassis `002`, car `2`.
    pub fn parse(vehicle_id: &str) -> Result<Self, AnalysisError> {
        let mut parts = vehicle_id.trim().split('-').skip(1);
        let chassis = parts
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AnalysisError::InvalidVehicleId(vehicle_id.to_string()))?;
        let car_number = parts
            .next()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .ok_or_else(|| AnalysisError::InvalidVehicleId(vehicle_id.to_string()))?;

        Ok(Self::new(chassis, car_number))
    }
}

/// Identifies one lap of one car in one race.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LapKey {
    pub circuit: String,
    pub race: String,
    pub vehicle: Vehicle,
    pub lap_number: u32,
}

impl LapKey {
    pub fn new(circuit: &str, race: &str, vehicle: Vehicle, lap_number: u32) -> Self {
        Self {
            circuit: circuit.to_string(),
            race: race.to_string(),
            vehicle,
            lap_number,
        }
    }
}

/// A lap-completion event from the timing loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LapEvent {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub vehicle: Vehicle,
    pub lap: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LapTime {
    pub vehicle: Vehicle,
    pub lap_number: u32,
    pub lap_time: f64,
}

impl LapTime {
    pub fn formatted(&self) -> String {
        format_lap_time(self.lap_time)
    }
}

/// A lap with its normalized telemetry. The telemetry may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Lap {
    pub key: LapKey,
    pub lap_time: f64,
    pub formatted_time: String,
    pub telemetry: Vec<TelemetryPoint>,
}

impl Lap {
    pub fn new(key: LapKey, lap_time: f64, telemetry: Vec<TelemetryPoint>) -> Self {
        Self {
            key,
            formatted_time: format_lap_time(lap_time),
            lap_time,
            telemetry,
        }
    }

    pub fn has_telemetry(&self) -> bool {
        !self.telemetry.is_empty()
    }
}

/// Reference lap for a (circuit, race).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoldenLap {
    pub circuit: String,
    pub race: String,
    pub chassis: String,
    pub car_number: u32,
    pub lap: u32,
    pub time: f64,
    pub formatted_time: String,
}

impl GoldenLap {
    pub fn from_lap_time(circuit: &str, race: &str, lap: &LapTime) -> Self {
        Self {
            circuit: circuit.to_string(),
            race: race.to_string(),
            chassis: lap.vehicle.chassis.clone(),
            car_number: lap.vehicle.car_number,
            lap: lap.lap_number,
            time: lap.lap_time,
            formatted_time: lap.formatted(),
        }
    }

    pub fn vehicle(&self) -> Vehicle {
        Vehicle::new(self.chassis.clone(), self.car_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSummary {
    pub chassis: String,
    pub car_number: u32,
    pub total_laps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapListing {
    pub lap_number: u32,
    pub lap_time: f64,
    pub formatted_time: String,
}

/// Format seconds as `M:SS.mmm`.
pub fn format_lap_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "-:--.---".to_string();
    }
    let millis = (seconds * 1000.0).round() as u64;
    format!(
        "{}:{:02}.{:03}",
        millis / 60_000,
        millis % 60_000 / 1000,
        millis % 1000
    )
}

/// Normalize a raw lap counter. Returns `None` for laps that should be dropped.
pub fn normalize_lap_number(raw: i64) -> Option<u32> {
    let lap = if raw > LAP_COUNTER_FLAG_THRESHOLD {
        raw & LAP_COUNTER_MASK
    } else {
        raw
    };
    (lap > 0).then(|| lap as u32)
}

/// Derive lap times from consecutive lap events of each vehicle.
///
/// The first event of a vehicle has no predecessor and yields no lap. Laps
/// outside `[min_s, max_s]` (out-laps, pit stops, timing glitches) are dropped.
/// Output is ordered by vehicle, then lap number.
pub fn lap_times_from_events(events: &[LapEvent], min_s: f64, max_s: f64) -> Vec<LapTime> {
    let mut by_vehicle: HashMap<&Vehicle, Vec<&LapEvent>> = HashMap::new();
    for event in events {
        by_vehicle.entry(&event.vehicle).or_default().push(event);
    }

    let mut vehicles: Vec<&Vehicle> = by_vehicle.keys().copied().collect();
    vehicles.sort();

    let mut lap_times = Vec::new();
    for vehicle in vehicles {
        let mut vehicle_events = by_vehicle.remove(vehicle).unwrap_or_default();
        vehicle_events.sort_by_key(|e| e.lap);

        for pair in vehicle_events.windows(2) {
            let lap_time = pair[1].timestamp - pair[0].timestamp;
            if lap_time >= min_s && lap_time <= max_s {
                lap_times.push(LapTime {
                    vehicle: vehicle.clone(),
                    lap_number: pair[1].lap,
                    lap_time,
                });
            }
        }
    }

    lap_times
}
