use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
    time::SystemTime,
};

use activity_tracker_lib::{ActivityRecord, Position, TrackPoint};
use chrono::{DateTime, Utc};
use gpx::{Gpx, GpxVersion, Time, Track, TrackSegment, Waypoint};
use time::OffsetDateTime;
use tracing::warn;

use crate::error::DriverError;

/// Reads every timed track point, in file order. Points without a time
/// cannot be replayed and are skipped.
pub fn read_gpx<R: Read>(reader: R) -> Result<Vec<TrackPoint>, DriverError> {
    let gpx = gpx::read(reader)?;

    let mut track_points = Vec::new();
    let mut untimed = 0;
    for track in gpx.tracks {
        for segment in track.segments {
            for point in segment.points {
                let Some(time) = &point.time else {
                    untimed += 1;
                    continue;
                };

                let timestamp = DateTime::parse_from_rfc3339(&time.format()?)?.with_timezone(&Utc);
                let mut track_point = TrackPoint::new(Position::from(point.point()), timestamp);
                track_point.altitude = point.elevation;
                track_point.speed = point.speed;
                track_points.push(track_point);
            }
        }
    }

    if untimed > 0 {
        warn!("Skipped {} track points without a timestamp", untimed);
    }
    Ok(track_points)
}

pub fn read_gpx_file(path: impl AsRef<Path>) -> Result<Vec<TrackPoint>, DriverError> {
    let file = File::open(path)?;
    read_gpx(BufReader::new(file))
}

fn gpx_time(timestamp: DateTime<Utc>) -> Time {
    let time: SystemTime = timestamp.into();
    let time: OffsetDateTime = time.into();
    Time::from(time)
}

/// Writes a finished session as a single-track GPX 1.1 document.
pub fn write_gpx<W: Write>(record: &ActivityRecord, writer: W) -> Result<(), DriverError> {
    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some("activity-replay".to_string());
    gpx.metadata = Some(gpx::Metadata {
        name: Some(format!("Session {}", record.session_id)),
        time: Some(gpx_time(record.started_at)),
        ..Default::default()
    });

    let mut segment = TrackSegment::new();
    for sample in &record.samples {
        let mut waypoint = Waypoint::new(sample.position.point());
        waypoint.elevation = sample.altitude;
        waypoint.time = Some(gpx_time(sample.timestamp));
        segment.points.push(waypoint);
    }

    let mut track = Track::new();
    track.segments.push(segment);
    gpx.tracks.push(track);

    gpx::write(&gpx, writer)?;
    Ok(())
}

pub fn write_gpx_file(record: &ActivityRecord, path: impl AsRef<Path>) -> Result<(), DriverError> {
    let file = File::create(path)?;
    write_gpx(record, BufWriter::new(file))
}
