use chrono::{DateTime, TimeZone, Utc};

use crate::proto::Position;

/// Fixed-point scale for latitude/longitude integers.
const COORD_SCALE: f64 = 1e-7;
/// Fixed-point scale for ground track (heading).
const TRACK_SCALE: f64 = 1e-5;

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", //
    "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundSpeed {
    pub meters_per_second: f64,
    pub kmh: f64,
    pub mph: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    pub degrees: f64,
    pub compass: &'static str,
}

/// Human-usable view of a raw position broadcast.
///
/// Fields are populated only when the fix actually carried them; the
/// firmware reports zero for everything it does not know, so zero checks
/// here decide presence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionReport {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<i32>,
    pub sats_in_view: Option<u32>,
    pub pdop: Option<u32>,
    pub hdop: Option<u32>,
    pub vdop: Option<u32>,
    pub fix_time: Option<DateTime<Utc>>,
    pub ground_speed: Option<GroundSpeed>,
    pub heading: Option<Heading>,
    pub precision_bits: Option<u32>,
}

impl PositionReport {
    pub fn from_position(position: &Position) -> Self {
        let mut report = Self::default();

        // A raw (0, 0) pair means "no fix", not the Gulf of Guinea.
        if position.latitude_i != 0 || position.longitude_i != 0 {
            report.latitude = Some(f64::from(position.latitude_i) * COORD_SCALE);
            report.longitude = Some(f64::from(position.longitude_i) * COORD_SCALE);
        }

        if position.altitude != 0 {
            report.altitude = Some(position.altitude);
        }
        if position.sats_in_view > 0 {
            report.sats_in_view = Some(position.sats_in_view);
        }
        if position.pdop > 0 {
            report.pdop = Some(position.pdop);
        }
        if position.hdop > 0 {
            report.hdop = Some(position.hdop);
        }
        if position.vdop > 0 {
            report.vdop = Some(position.vdop);
        }
        if position.time > 0 {
            report.fix_time = Utc.timestamp_opt(i64::from(position.time), 0).single();
        }

        if position.ground_speed > 0 {
            // Wire unit is mm/s.
            let meters_per_second = f64::from(position.ground_speed) / 1000.0;
            let kmh = meters_per_second * 3.6;
            report.ground_speed = Some(GroundSpeed {
                meters_per_second,
                kmh,
                mph: kmh * 0.621_371,
            });
        }

        if position.ground_track > 0 {
            let degrees = f64::from(position.ground_track) * TRACK_SCALE;
            report.heading = Some(Heading {
                degrees,
                compass: compass_point(degrees),
            });
        }

        if position.precision_bits > 0 {
            report.precision_bits = Some(position.precision_bits);
        }

        report
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn maps_url(&self) -> Option<String> {
        self.coordinates()
            .map(|(lat, lon)| format!("https://maps.google.com/maps?q={lat},{lon}"))
    }
}

/// Bucket a heading into one of 16 compass points.
fn compass_point(degrees: f64) -> &'static str {
    let index = ((degrees + 11.25) / 22.5) as usize % 16;
    COMPASS_POINTS[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_fixed_point_coordinates() {
        let report = PositionReport::from_position(&Position {
            latitude_i: 377749000,
            longitude_i: -1224194000,
            ..Default::default()
        });
        let (lat, lon) = report.coordinates().unwrap();
        assert!((lat - 37.7749).abs() < 1e-6);
        assert!((lon - (-122.4194)).abs() < 1e-6);
    }

    #[test]
    fn zero_zero_pair_is_absent() {
        let report = PositionReport::from_position(&Position::default());
        assert!(report.coordinates().is_none());
        assert!(report.maps_url().is_none());
    }

    #[test]
    fn single_zero_axis_is_still_a_fix() {
        // A node parked exactly on the prime meridian keeps its latitude.
        let report = PositionReport::from_position(&Position {
            latitude_i: 515074000,
            longitude_i: 0,
            ..Default::default()
        });
        assert_eq!(report.longitude, Some(0.0));
        assert!((report.latitude.unwrap() - 51.5074).abs() < 1e-6);
    }

    #[test]
    fn converts_ground_speed_units() {
        let report = PositionReport::from_position(&Position {
            latitude_i: 1,
            ground_speed: 10_000, // 10 m/s
            ..Default::default()
        });
        let speed = report.ground_speed.unwrap();
        assert!((speed.meters_per_second - 10.0).abs() < 1e-9);
        assert!((speed.kmh - 36.0).abs() < 1e-9);
        assert!((speed.mph - 22.369_356).abs() < 1e-4);
    }

    #[test]
    fn compass_bucketing() {
        assert_eq!(compass_point(0.0), "N");
        assert_eq!(compass_point(11.24), "N");
        assert_eq!(compass_point(11.26), "NNE");
        assert_eq!(compass_point(45.0), "NE");
        assert_eq!(compass_point(90.0), "E");
        assert_eq!(compass_point(180.0), "S");
        assert_eq!(compass_point(270.0), "W");
        assert_eq!(compass_point(355.0), "N");
    }

    #[test]
    fn heading_scales_from_fixed_point() {
        let report = PositionReport::from_position(&Position {
            latitude_i: 1,
            ground_track: 9_000_000, // 90 degrees
            ..Default::default()
        });
        let heading = report.heading.unwrap();
        assert!((heading.degrees - 90.0).abs() < 1e-9);
        assert_eq!(heading.compass, "E");
    }

    #[test]
    fn quality_fields_surface_only_when_present() {
        let report = PositionReport::from_position(&Position {
            latitude_i: 1,
            sats_in_view: 9,
            hdop: 150,
            time: 1_700_000_000,
            precision_bits: 32,
            ..Default::default()
        });
        assert_eq!(report.sats_in_view, Some(9));
        assert_eq!(report.hdop, Some(150));
        assert_eq!(report.pdop, None);
        assert_eq!(report.precision_bits, Some(32));
        assert_eq!(report.fix_time.unwrap().timestamp(), 1_700_000_000);
    }
}
