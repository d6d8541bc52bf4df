use chrono::{DateTime, Utc};
use geo_types::{Coord, LineString, Point};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A geographic position in degrees. geo-types is x/y, so the wrapped point
/// holds longitude in `x` and latitude in `y`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position(pub Point<f64>);

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self(Point::new(longitude, latitude))
    }

    pub fn latitude(&self) -> f64 {
        self.0.y()
    }

    pub fn longitude(&self) -> f64 {
        self.0.x()
    }

    pub fn point(&self) -> Point<f64> {
        self.0
    }
}

impl From<Point<f64>> for Position {
    fn from(point: Point<f64>) -> Self {
        Self(point)
    }
}

impl From<Position> for Point<f64> {
    fn from(position: Position) -> Self {
        position.0
    }
}

impl From<Position> for Coord<f64> {
    fn from(position: Position) -> Self {
        position.0 .0
    }
}

/// A single positioning reading as delivered by the positioning source.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub position: Position,
    /// Meters above sea level, if the fix carried one.
    pub altitude: Option<f64>,
    /// Instantaneous speed in m/s, if the receiver reported one.
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TrackPoint {
    pub fn new(position: Position, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            altitude: None,
            speed: None,
            timestamp,
        }
    }

    pub fn at(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self::new(Position::new(latitude, longitude), timestamp)
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }
}

/// Builds a line string for map layers out of a polyline.
pub fn to_line_string<I>(positions: I) -> LineString<f64>
where
    I: IntoIterator<Item = Position>,
{
    LineString::new(positions.into_iter().map(Coord::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_string_uses_lon_lat_order() {
        let line = to_line_string([Position::new(55.0, 12.0), Position::new(55.1, 12.2)]);
        let coords: Vec<_> = line.coords().copied().collect();

        assert_eq!(coords.len(), 2);
        assert_eq!(coords[0], Coord { x: 12.0, y: 55.0 });
        assert_eq!(coords[1], Coord { x: 12.2, y: 55.1 });
    }

    #[test]
    fn builder_sets_optional_fields() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let point = TrackPoint::at(1.0, 2.0, ts).with_altitude(0.0).with_speed(3.5);

        // Zero altitude is a reading, not a missing value.
        assert_eq!(point.altitude, Some(0.0));
        assert_eq!(point.speed, Some(3.5));
        assert_eq!(point.timestamp, ts);
    }

    #[test]
    fn position_wraps_a_lon_lat_point() {
        let position = Position::new(56.15, 10.2);

        assert_eq!(position.point(), Point::new(10.2, 56.15));
        assert_eq!(position.latitude(), 56.15);
        assert_eq!(position.longitude(), 10.2);
        assert_eq!(Position::from(Point::new(10.2, 56.15)), position);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn track_point_survives_json() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let point = TrackPoint::at(56.15, 10.2, ts).with_altitude(12.5);

        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["position"], serde_json::json!({ "x": 10.2, "y": 56.15 }));
        assert_eq!(json["altitude"], serde_json::json!(12.5));
        assert_eq!(json["speed"], serde_json::Value::Null);

        let parsed: TrackPoint = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, point);
    }
}
