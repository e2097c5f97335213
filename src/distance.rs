use std::f64::consts::PI;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Maximum accepted distance between a claim and its destination: expected
/// GPS error plus slack.
pub const GEOFENCE_RADIUS_METERS: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    Within,
    Outside,
}

fn radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

/// Great-circle distance in meters between two WGS84 points, using the
/// haversine formula on a spherical earth.
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = radians(lat1);
    let phi2 = radians(lat2);
    let delta_phi = radians(lat2 - lat1);
    let delta_lambda = radians(lon2 - lon1);

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// A distance equal to the threshold is `Outside`.
pub fn classify(distance_meters: f64, threshold_meters: f64) -> Proximity {
    if distance_meters < threshold_meters {
        Proximity::Within
    } else {
        Proximity::Outside
    }
}
