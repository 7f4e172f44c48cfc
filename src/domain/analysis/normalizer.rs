// Telemetry normalizer: raw logger rows to filled, sorted, de-duplicated points
use crate::domain::telemetry::{ChannelSample, RawRow, TelemetryPoint};
use crate::domain::units::{haversine_m, kmh_to_mps, mps_to_kmh};
use std::cmp::Ordering;
use std::sync::Arc;

/// Samples closer than this along the lap collapse into the later one.
pub const DUPLICATE_DISTANCE_EPSILON: f64 = 0.001;

/// Speeds derived from GPS above this are logger glitches.
const MAX_GPS_SPEED_KMH: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Distance,
    Speed,
    Throttle,
    Brake,
    Longitude,
    Latitude,
}

/// Source names accepted for each canonical channel, in priority order.
pub const CHANNEL_ALIASES: &[(Channel, &[&str])] = &[
    (
        Channel::Distance,
        &["Laptrigger_lapdist_dls", "lap_distance", "distance"],
    ),
    (Channel::Speed, &["Speed", "speed"]),
    (Channel::Throttle, &["aps", "ath", "throttle"]),
    (Channel::Brake, &["pbrake_f", "brake"]),
    (
        Channel::Longitude,
        &["VBOX_Long_Minutes", "longitude", "lon"],
    ),
    (Channel::Latitude, &["VBOX_Lat_Min", "latitude", "lat"]),
];

/// Source column chosen for every canonical channel of one lap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMap {
    pub distance: Option<String>,
    pub speed: Option<String>,
    pub throttle: Option<String>,
    pub brake: Option<String>,
    pub longitude: Option<String>,
    pub latitude: Option<String>,
}

impl ChannelMap {
    /// Resolve the alias table against the columns present in `rows`.
    pub fn resolve(rows: &[RawRow]) -> Self {
        let present = |name: &str| rows.iter().any(|r| r.channels.contains_key(name));
        let pick = |channel: Channel| {
            CHANNEL_ALIASES
                .iter()
                .filter(|(c, _)| *c == channel)
                .flat_map(|(_, names)| names.iter())
                .find(|name| present(name))
                .map(|name| name.to_string())
        };

        let distance = pick(Channel::Distance).or_else(|| {
            // Loggers name the lap distance channel inconsistently
            let mut candidates: Vec<&Arc<str>> = rows
                .iter()
                .flat_map(|r| r.channels.keys())
                .filter(|name| is_lap_distance_name(name))
                .collect();
            candidates.sort();
            candidates.first().map(|name| name.to_string())
        });

        Self {
            distance,
            speed: pick(Channel::Speed),
            throttle: pick(Channel::Throttle),
            brake: pick(Channel::Brake),
            longitude: pick(Channel::Longitude),
            latitude: pick(Channel::Latitude),
        }
    }

    fn value(&self, row: &RawRow, channel: Channel) -> Option<f64> {
        let name = match channel {
            Channel::Distance => &self.distance,
            Channel::Speed => &self.speed,
            Channel::Throttle => &self.throttle,
            Channel::Brake => &self.brake,
            Channel::Longitude => &self.longitude,
            Channel::Latitude => &self.latitude,
        };
        name.as_deref().and_then(|n| row.get(n))
    }
}

/// Whether any lap could read `name` as one of its canonical channels.
pub fn is_known_channel(name: &str) -> bool {
    CHANNEL_ALIASES
        .iter()
        .flat_map(|(_, names)| names.iter())
        .any(|alias| *alias == name)
        || is_lap_distance_name(name)
}

fn is_lap_distance_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("lap") && lower.contains("dist")
}

/// Pivot long-format samples into wide rows, one per timestamp.
/// The first value seen for a channel at a timestamp wins.
pub fn pivot(samples: &[ChannelSample]) -> Vec<RawRow> {
    let mut ordered: Vec<&ChannelSample> = samples.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut rows: Vec<RawRow> = Vec::new();
    for sample in ordered {
        let starts_row = rows
            .last()
            .and_then(|r| r.timestamp)
            .is_none_or(|ts| ts != sample.timestamp);
        if starts_row {
            rows.push(RawRow::new(Some(sample.timestamp)));
        }
        if let (Some(value), Some(row)) = (sample.value, rows.last_mut()) {
            row.channels.entry(sample.name.clone()).or_insert(value);
        }
    }

    rows
}

/// Rows of one lap in time order with every channel filled. Distance stays
/// `None` where it cannot be known.
struct FilledLap {
    distances: Vec<Option<f64>>,
    points: Vec<TelemetryPoint>,
}

fn fill_channels(rows: &[RawRow], interpolate_distance: bool) -> Option<FilledLap> {
    if rows.is_empty() {
        return None;
    }

    let channels = ChannelMap::resolve(rows);

    let mut ordered: Vec<&RawRow> = rows.iter().collect();
    ordered.sort_by(|a, b| compare_timestamps(a.timestamp, b.timestamp));
    let axis = time_axis(&ordered);
    let series = |channel: Channel| -> Vec<Option<f64>> {
        ordered.iter().map(|row| channels.value(row, channel)).collect()
    };

    let speeds = fill_gaps(&speed_series(&ordered, &channels));

    let distances: Vec<Option<f64>> = if channels.distance.is_some() {
        let raw = series(Channel::Distance);
        if interpolate_distance {
            interpolate_gaps(&axis, &raw).into_iter().map(Some).collect()
        } else {
            raw
        }
    } else if ordered.iter().any(|r| r.timestamp.is_some()) {
        tracing::debug!("Distance channel missing; integrating speed over time");
        integrate_distance(&ordered, &speeds)
    } else {
        return None;
    };

    let throttle = interpolate_gaps(&axis, &series(Channel::Throttle));
    let brake = interpolate_gaps(&axis, &series(Channel::Brake));
    let longitude = interpolate_gaps(&axis, &series(Channel::Longitude));
    let latitude = interpolate_gaps(&axis, &series(Channel::Latitude));

    let points = (0..ordered.len())
        .map(|i| TelemetryPoint {
            distance: distances[i].unwrap_or(0.0),
            speed: speeds[i],
            throttle: throttle[i],
            brake: brake[i],
            longitude: longitude[i],
            latitude: latitude[i],
        })
        .collect();

    Some(FilledLap { distances, points })
}

/// Clean one lap's raw rows into a canonical point sequence.
///
/// Pedal and GPS gaps are interpolated over time from the neighbouring
/// samples, so channels logged at their own timestamps line up with the
/// distance channel. Returns an empty sequence when fewer than two usable
/// points remain.
pub fn normalize(rows: &[RawRow]) -> Vec<TelemetryPoint> {
    let Some(lap) = fill_channels(rows, false) else {
        return Vec::new();
    };

    let points = lap
        .points
        .into_iter()
        .zip(lap.distances)
        .filter_map(|(point, distance)| {
            Some(TelemetryPoint {
                distance: distance?,
                ..point
            })
        })
        .collect();

    normalize_points(points)
}

/// One lap's points in the order they were logged, for replay. Distance is
/// interpolated like the other channels and never re-sorted, so noisy
/// lap-distance readings do not make the car jump back and forth.
pub fn time_ordered(rows: &[RawRow]) -> Vec<TelemetryPoint> {
    let Some(lap) = fill_channels(rows, true) else {
        return Vec::new();
    };
    let points: Vec<TelemetryPoint> = lap
        .points
        .into_iter()
        .filter(|p| p.distance.is_finite())
        .collect();
    if points.len() < 2 {
        return Vec::new();
    }
    points
}

/// Sort by distance and collapse near-duplicate distances, keeping the later
/// sample. Idempotent.
pub fn normalize_points(mut points: Vec<TelemetryPoint>) -> Vec<TelemetryPoint> {
    points.retain(|p| p.distance.is_finite());
    points.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let mut deduped: Vec<TelemetryPoint> = Vec::with_capacity(points.len());
    for point in points {
        match deduped.last_mut() {
            Some(last) if point.distance - last.distance <= DUPLICATE_DISTANCE_EPSILON => {
                *last = point;
            }
            _ => deduped.push(point),
        }
    }

    if deduped.len() < 2 {
        return Vec::new();
    }
    deduped
}

fn compare_timestamps(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Interpolation axis: timestamps when every row has one, row positions
/// otherwise.
fn time_axis(rows: &[&RawRow]) -> Vec<f64> {
    let timestamps: Option<Vec<f64>> = rows.iter().map(|r| r.timestamp).collect();
    timestamps.unwrap_or_else(|| (0..rows.len()).map(|i| i as f64).collect())
}

fn speed_series(rows: &[&RawRow], channels: &ChannelMap) -> Vec<Option<f64>> {
    if channels.speed.is_some() {
        return rows
            .iter()
            .map(|row| channels.value(row, Channel::Speed))
            .collect();
    }

    if channels.longitude.is_none() || channels.latitude.is_none() {
        return vec![None; rows.len()];
    }

    tracing::debug!("Speed channel missing; deriving speed from GPS");
    let mut speeds = Vec::with_capacity(rows.len());
    let mut previous: Option<(f64, f64, f64)> = None;
    for row in rows {
        let fix = match (
            row.timestamp,
            channels.value(row, Channel::Longitude),
            channels.value(row, Channel::Latitude),
        ) {
            (Some(ts), Some(lon), Some(lat)) => Some((ts, lon, lat)),
            _ => None,
        };

        let speed = match (previous, fix) {
            (Some((t0, lon0, lat0)), Some((t1, lon1, lat1))) if t1 > t0 => {
                let metres = haversine_m(lon0, lat0, lon1, lat1);
                mps_to_kmh(metres / (t1 - t0)).clamp(0.0, MAX_GPS_SPEED_KMH)
            }
            _ => 0.0,
        };
        speeds.push(Some(speed));
        if fix.is_some() {
            previous = fix;
        }
    }
    speeds
}

/// Forward fill, then back fill, then zero.
fn fill_gaps(values: &[Option<f64>]) -> Vec<f64> {
    let first_known = values.iter().flatten().next().copied().unwrap_or(0.0);
    let mut last = None;
    values
        .iter()
        .map(|v| {
            if v.is_some() {
                last = *v;
            }
            last.unwrap_or(first_known)
        })
        .collect()
}

/// Linear interpolation between known neighbours along `axis`. Leading and
/// trailing gaps take the nearest known value; a channel that was never
/// logged is zero.
fn interpolate_gaps(axis: &[f64], values: &[Option<f64>]) -> Vec<f64> {
    let known: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    let (Some(&(_, first)), Some(&(_, last))) = (known.first(), known.last()) else {
        return vec![0.0; values.len()];
    };

    let mut next = 0;
    (0..values.len())
        .map(|i| {
            if let Some(v) = values[i] {
                return v;
            }
            while next < known.len() && known[next].0 < i {
                next += 1;
            }
            match (next.checked_sub(1).map(|p| known[p]), known.get(next)) {
                (Some((i0, v0)), Some(&(i1, v1))) => {
                    let span = axis[i1] - axis[i0];
                    if span > 0.0 {
                        v0 + (v1 - v0) * (axis[i] - axis[i0]) / span
                    } else {
                        v0
                    }
                }
                (None, _) => first,
                (_, None) => last,
            }
        })
        .collect()
}

fn integrate_distance(rows: &[&RawRow], speeds: &[f64]) -> Vec<Option<f64>> {
    let mut total = 0.0;
    let mut previous_ts: Option<f64> = None;
    rows.iter()
        .zip(speeds)
        .map(|(row, speed)| {
            let dt = match (previous_ts, row.timestamp) {
                (Some(t0), Some(t1)) => (t1 - t0).max(0.0),
                _ => 0.0,
            };
            if row.timestamp.is_some() {
                previous_ts = row.timestamp;
            }
            total += kmh_to_mps(*speed) * dt;
            Some(total)
        })
        .collect()
}
