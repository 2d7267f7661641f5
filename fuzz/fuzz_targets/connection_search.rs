#![no_main]
use arbitrary::Arbitrary;
use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;
use transit_schedule_core::{
    find_connections, import_contents, ArchiveContents, ConnectionQuery, ImportOptions,
    NoOpProgress, VersionManager,
};
use transit_schedule_model::GtfsTime;

#[derive(Debug, Arbitrary)]
struct FuzzData {
    stop_times: Vec<StopTimeData>,
    from_stop: u8,
    to_stop: u8,
    query_seconds: u32,
    limit: u8,
}

#[derive(Debug, Arbitrary)]
struct StopTimeData {
    trip: u8,
    stop: u8,
    sequence: u16,
    seconds: u32,
}

fuzz_target!(|data: FuzzData| {
    let mut stop_times = String::from("trip_id,arrival_time,departure_time,stop_id,stop_sequence\n");
    for entry in &data.stop_times {
        let time = GtfsTime::from_seconds(entry.seconds % (48 * 3600));
        stop_times.push_str(&format!(
            "T{},{time},{time},S{},{}\n",
            entry.trip % 8,
            entry.stop % 8,
            entry.sequence
        ));
    }
    let stops: String = (0..8).map(|i| format!("S{i},Stop {i},1,1\n")).collect();
    let trips: String = (0..8).map(|i| format!("R1,WK,T{i}\n")).collect();

    let contents = ArchiveContents::from_files([
        ("agency.txt", "agency_name,agency_url,agency_timezone\nA,u,UTC\n".to_string()),
        ("stops.txt", format!("stop_id,stop_name,stop_lat,stop_lon\n{stops}")),
        ("routes.txt", "route_id,route_short_name,route_type\nR1,1,3\n".to_string()),
        ("trips.txt", format!("route_id,service_id,trip_id\n{trips}")),
        ("stop_times.txt", stop_times),
        ("calendar_dates.txt", "service_id,date,exception_type\nWK,20240102,1\n".to_string()),
    ]);
    let manager = VersionManager::new();
    if import_contents(&manager, &contents, "fuzz.zip", 0, ImportOptions::default(), &NoOpProgress).is_err() {
        return;
    }
    let Some(dataset) = manager.active_dataset() else {
        return;
    };
    let Some(date) = NaiveDate::from_ymd_opt(2024, 1, 2) else {
        return;
    };
    let query = ConnectionQuery::new(
        format!("S{}", data.from_stop % 8),
        format!("S{}", data.to_stop % 8),
        date,
        GtfsTime::from_seconds(data.query_seconds % (48 * 3600)),
    )
    .with_limit(data.limit as usize);

    let found = find_connections(&dataset, &query);
    assert!(found.len() <= data.limit as usize);
    assert!(found.windows(2).all(|pair| pair[0].departure_time <= pair[1].departure_time));
    assert!(found.iter().all(|c| c.departure_time >= query.time));
});
