// Unit conversions shared by every cross-channel calculation.
// Speeds are km/h, distances meters and times seconds everywhere else in the
// crate; anything mixing them goes through this module.
use uom::si::f64::{Length, Time, Velocity};
use uom::si::length::meter;
use uom::si::time::second;
use uom::si::velocity::{kilometer_per_hour, meter_per_second};

/// Mean Earth radius used for GPS distances.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One arc-minute of latitude, used to turn logger GPS deltas into meters.
pub const METERS_PER_ARC_MINUTE: f64 = 1852.0;

pub fn kmh(value: f64) -> Velocity {
    Velocity::new::<kilometer_per_hour>(value)
}

pub fn meters(value: f64) -> Length {
    Length::new::<meter>(value)
}

pub fn kmh_to_mps(value: f64) -> f64 {
    kmh(value).get::<meter_per_second>()
}

pub fn mps_to_kmh(value: f64) -> f64 {
    Velocity::new::<meter_per_second>(value).get::<kilometer_per_hour>()
}

/// Time needed to cover `length_m` at a constant `speed_kmh`.
/// Returns `None` for a non-positive speed.
pub fn travel_time_s(length_m: f64, speed_kmh: f64) -> Option<f64> {
    if speed_kmh <= 0.0 || !speed_kmh.is_finite() || !length_m.is_finite() {
        return None;
    }
    let time: Time = meters(length_m) / kmh(speed_kmh);
    finite(time.get::<second>())
}

/// Seconds gained over `length_m` if the driver had matched the reference speed.
pub fn time_gain_s(length_m: f64, driver_kmh: f64, reference_kmh: f64) -> f64 {
    match (
        travel_time_s(length_m, driver_kmh),
        travel_time_s(length_m, reference_kmh),
    ) {
        (Some(driver), Some(reference)) => driver - reference,
        _ => 0.0,
    }
}

/// Great-circle distance between two GPS fixes given in degrees.
pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let dlon = lon2 - lon1;
    let dlat = lat2 - lat1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_M
}

/// Drops NaN and infinities so they never reach a JSON body.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Like [`finite`] but collapses to zero, for fields that must stay numeric.
pub fn finite_or_zero(value: f64) -> f64 {
    finite(value).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_speed_conversions() {
        assert_relative_eq!(kmh_to_mps(36.0), 10.0, epsilon = 1e-9);
        assert_relative_eq!(mps_to_kmh(10.0), 36.0, epsilon = 1e-9);
    }

    #[test]
    fn test_travel_time() {
        assert_relative_eq!(travel_time_s(200.0, 72.0).unwrap(), 10.0, epsilon = 1e-9);
        assert_eq!(travel_time_s(200.0, 0.0), None);
        assert_eq!(travel_time_s(200.0, -5.0), None);
    }

    #[test]
    fn test_time_gain_uses_harmonic_difference() {
        let gain = time_gain_s(200.0, 95.0, 100.0);
        let expected = 200.0 * 3.6 * (1.0 / 95.0 - 1.0 / 100.0);
        assert_relative_eq!(gain, expected, epsilon = 1e-9);
        assert_eq!(time_gain_s(200.0, 0.0, 100.0), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_m(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(d, 111_194.9, epsilon = 1.0);
    }

    #[test]
    fn test_finite() {
        assert_eq!(finite(f64::NAN), None);
        assert_eq!(finite(f64::INFINITY), None);
        assert_eq!(finite(1.5), Some(1.5));
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
    }
}
