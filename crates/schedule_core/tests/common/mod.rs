#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

pub const AGENCY: &str = "agency_id,agency_name,agency_url,agency_timezone,agency_lang\n\
M,Metro,https://metro.example,Europe/Berlin,de\n";
pub const STOPS: &str = "stop_id,stop_name,stop_lat,stop_lon\n\
A,Alpha,48.1000,11.5000\n\
B,Beta,48.2000,11.6000\n";
pub const ROUTES: &str = "route_id,agency_id,route_short_name,route_long_name,route_type\n\
R1,M,U1,Alpha - Beta,1\n";
pub const TRIPS: &str = "route_id,service_id,trip_id,trip_headsign,wheelchair_accessible\n\
R1,WK,T1,Beta,1\n";
pub const STOP_TIMES: &str = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
T1,08:00:00,08:00:00,A,1\n\
T1,08:15:00,08:15:00,B,2\n";
pub const CALENDAR_DATES: &str = "service_id,date,exception_type\n\
WK,20240102,1\n";

/// Files of the smallest feed that yields one connection A -> B.
pub fn minimal_feed() -> Vec<(&'static str, String)> {
    vec![
        ("agency.txt", AGENCY.to_string()),
        ("stops.txt", STOPS.to_string()),
        ("routes.txt", ROUTES.to_string()),
        ("trips.txt", TRIPS.to_string()),
        ("stop_times.txt", STOP_TIMES.to_string()),
        ("calendar_dates.txt", CALENDAR_DATES.to_string()),
    ]
}

/// The minimal feed with one file replaced.
pub fn feed_with(name: &str, content: &str) -> Vec<(&'static str, String)> {
    minimal_feed()
        .into_iter()
        .map(|(file, text)| {
            if file == name {
                (file, content.to_string())
            } else {
                (file, text)
            }
        })
        .collect()
}

pub fn feed_without(name: &str) -> Vec<(&'static str, String)> {
    minimal_feed()
        .into_iter()
        .filter(|(file, _)| *file != name)
        .collect()
}

pub fn zip_archive(files: &[(&str, String)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start zip entry");
        writer
            .write_all(content.as_bytes())
            .expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}
