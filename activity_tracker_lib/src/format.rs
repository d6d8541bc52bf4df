//! Display strings for dashboard values.

use chrono::TimeDelta;

/// `H:MM:SS` from one hour up, `M:SS` below.
pub fn format_duration(duration: TimeDelta) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Whole meters below a kilometer, kilometers with two decimals above.
pub fn format_distance(meters: f64) -> String {
    let meters = meters.max(0.0);
    if meters < 1000.0 {
        format!("{} m", meters.trunc() as u64)
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

/// Minutes per kilometer as `MM:SS`.
pub fn format_pace(pace_min_per_km: Option<f64>) -> String {
    match pace_min_per_km {
        Some(pace) if pace.is_finite() && pace >= 0.0 => {
            let total_seconds = (pace * 60.0).round() as u64;
            format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
        }
        _ => "--:--".to_string(),
    }
}

pub fn format_speed(speed_kmh: f64) -> String {
    format!("{:.1} km/h", speed_kmh)
}

pub fn format_elevation(meters: f64) -> String {
    format!("{} m", meters.round() as i64)
}
