//! Great-circle distance on a spherical Earth.

use wayfarer_core::types::Coordinate;

/// Earth radius used by the mapping provider's geometry library.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Haversine distance between two coordinates, in meters.
pub fn spherical_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// Distance rounded to the nearest whole meter.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> u32 {
    spherical_distance(a, b).round() as u32
}
