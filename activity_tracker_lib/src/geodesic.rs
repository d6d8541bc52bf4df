use crate::track_point::Position;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters on a spherical Earth.
pub fn haversine_distance(p1: Position, p2: Position) -> f64 {
    let d_lat = (p2.latitude() - p1.latitude()).to_radians();
    let d_lon = (p2.longitude() - p1.longitude()).to_radians();
    let lat1 = p1.latitude().to_radians();
    let lat2 = p2.latitude().to_radians();

    let a = f64::sin(d_lat / 2.).powi(2)
        + f64::cos(lat1) * f64::cos(lat2) * f64::sin(d_lon / 2.).powi(2);

    // Rounding can push `a` a hair above 1 for antipodal points.
    let c = 2. * f64::asin(f64::sqrt(a.min(1.)));

    EARTH_RADIUS_M * c
}

/// Forward azimuth from `p1` towards `p2`, in degrees clockwise from north.
pub fn initial_bearing(p1: Position, p2: Position) -> f64 {
    let lat1 = p1.latitude().to_radians();
    let lat2 = p2.latitude().to_radians();
    let d_lon = (p2.longitude() - p1.longitude()).to_radians();

    let y = f64::sin(d_lon) * f64::cos(lat2);
    let x = f64::cos(lat1) * f64::sin(lat2) - f64::sin(lat1) * f64::cos(lat2) * f64::cos(d_lon);

    (y.atan2(x).to_degrees() + 360.).rem_euclid(360.)
}
