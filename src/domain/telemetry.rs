// Telemetry data domain models
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One normalized sample of a lap.
///
/// GPS values are the logger's raw units and are used directly as planar
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TelemetryPoint {
    /// Meters along the lap.
    pub distance: f64,
    /// km/h
    pub speed: f64,
    /// 0-100 %
    pub throttle: f64,
    /// Front brake pressure / percentage as logged.
    pub brake: f64,
    pub longitude: f64,
    pub latitude: f64,
}

/// A single long-format logger record: one channel value at one instant.
/// Channel names are shared between the samples of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSample {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub name: Arc<str>,
    pub value: Option<f64>,
}

impl ChannelSample {
    pub fn new(timestamp: f64, name: impl Into<Arc<str>>, value: Option<f64>) -> Self {
        Self {
            timestamp,
            name: name.into(),
            value,
        }
    }
}

/// A wide telemetry row keyed by source channel name. Absent channels are
/// simply missing from the map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow {
    pub timestamp: Option<f64>,
    pub channels: HashMap<Arc<str>, f64>,
}

impl RawRow {
    pub fn new(timestamp: Option<f64>) -> Self {
        Self {
            timestamp,
            channels: HashMap::new(),
        }
    }

    pub fn with(mut self, channel: &str, value: f64) -> Self {
        self.channels.insert(Arc::from(channel), value);
        self
    }

    pub fn get(&self, channel: &str) -> Option<f64> {
        self.channels.get(channel).copied().filter(|v| v.is_finite())
    }
}
