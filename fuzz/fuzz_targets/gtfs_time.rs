#![no_main]
use libfuzzer_sys::fuzz_target;
use transit_schedule_model::{GtfsDate, GtfsTime};

fuzz_target!(|data: &str| {
    if let Ok(time) = GtfsTime::parse(data) {
        assert_eq!(GtfsTime::parse(&time.to_string()).ok(), Some(time));
        assert!(time.wall_clock() <= chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap());
    }
    let _ = GtfsDate::parse(data);
});
