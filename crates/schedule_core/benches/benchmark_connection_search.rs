use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use transit_schedule_core::{
    ArchiveContents, ConnectionQuery, ImportOptions, NoOpProgress, VersionManager,
};
use transit_schedule_model::GtfsTime;

/// A corridor A -> B served every two minutes over the whole day.
fn corridor_feed(num_trips: usize) -> ArchiveContents {
    let mut trips = String::from("route_id,service_id,trip_id\n");
    let mut stop_times =
        String::from("trip_id,arrival_time,departure_time,stop_id,stop_sequence\n");
    for t in 0..num_trips {
        trips.push_str(&format!("R1,WK,T{t:05}\n"));
        let departs = GtfsTime::from_seconds((t as u32 * 120) % 86_400);
        let mid = GtfsTime::from_seconds(departs.total_seconds() + 300);
        let arrives = GtfsTime::from_seconds(departs.total_seconds() + 600);
        stop_times.push_str(&format!("T{t:05},{departs},{departs},A,1\n"));
        stop_times.push_str(&format!("T{t:05},{mid},{mid},M,2\n"));
        stop_times.push_str(&format!("T{t:05},{arrives},{arrives},B,3\n"));
    }

    ArchiveContents::from_files([
        (
            "agency.txt",
            "agency_name,agency_url,agency_timezone\nMetro,https://m.example,UTC\n".to_string(),
        ),
        (
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon\nA,Alpha,1,1\nM,Middle,1.5,1.5\nB,Beta,2,2\n"
                .to_string(),
        ),
        (
            "routes.txt",
            "route_id,route_short_name,route_type\nR1,1,3\n".to_string(),
        ),
        ("trips.txt", trips),
        ("stop_times.txt", stop_times),
        (
            "calendar_dates.txt",
            "service_id,date,exception_type\nWK,20240102,1\n".to_string(),
        ),
    ])
}

fn benchmark_connection_search(c: &mut Criterion) {
    let manager = VersionManager::new();
    transit_schedule_core::import_contents(
        &manager,
        &corridor_feed(20_000),
        "bench.zip",
        1,
        ImportOptions::default(),
        &NoOpProgress,
    )
    .expect("import");
    let dataset = manager.active_dataset().expect("active");
    let query = ConnectionQuery::new(
        "A",
        "B",
        NaiveDate::from_ymd_opt(2024, 1, 2).expect("date"),
        GtfsTime::from_hms(17, 30, 0),
    );

    c.bench_function("find connections on busy corridor", |b| {
        b.iter(|| transit_schedule_core::find_connections(black_box(&dataset), black_box(&query)))
    });
}

criterion_group!(benches, benchmark_connection_search);
criterion_main!(benches);
