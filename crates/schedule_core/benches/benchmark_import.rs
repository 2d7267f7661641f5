use criterion::{criterion_group, criterion_main, Criterion};
use transit_schedule_core::{ArchiveContents, ImportOptions, NoOpProgress, VersionManager};

/// Builds a feed with `num_trips` trips calling at `stops_per_trip` stops.
fn generate_feed(num_stops: usize, num_trips: usize, stops_per_trip: usize) -> ArchiveContents {
    let mut stops = String::from("stop_id,stop_name,stop_lat,stop_lon\n");
    for i in 0..num_stops {
        stops.push_str(&format!("S{i},Stop {i},{},{}\n", 48.0 + i as f64 * 0.001, 11.0));
    }

    let mut trips = String::from("route_id,service_id,trip_id\n");
    let mut stop_times =
        String::from("trip_id,arrival_time,departure_time,stop_id,stop_sequence\n");
    for t in 0..num_trips {
        trips.push_str(&format!("R{},WK,T{t}\n", t % 10));
        let start = 5 * 3600 + (t % 200) * 300;
        for s in 0..stops_per_trip {
            let seconds = start + s * 120;
            let time = format!(
                "{:02}:{:02}:{:02}",
                seconds / 3600,
                (seconds % 3600) / 60,
                seconds % 60
            );
            let stop = (t * 7 + s) % num_stops;
            stop_times.push_str(&format!("T{t},{time},{time},S{stop},{}\n", s + 1));
        }
    }

    let mut routes = String::from("route_id,route_short_name,route_type\n");
    for r in 0..10 {
        routes.push_str(&format!("R{r},{r},3\n"));
    }

    ArchiveContents::from_files([
        (
            "agency.txt",
            "agency_name,agency_url,agency_timezone\nMetro,https://m.example,UTC\n".to_string(),
        ),
        ("stops.txt", stops),
        ("routes.txt", routes),
        ("trips.txt", trips),
        ("stop_times.txt", stop_times),
        (
            "calendar_dates.txt",
            "service_id,date,exception_type\nWK,20240102,1\n".to_string(),
        ),
    ])
}

fn benchmark_import(c: &mut Criterion) {
    let contents = generate_feed(500, 2_000, 20);

    c.bench_function("import 2000 trips x 20 stops", |b| {
        b.iter(|| {
            let manager = VersionManager::new();
            transit_schedule_core::import_contents(
                &manager,
                &contents,
                "bench.zip",
                1,
                ImportOptions::default(),
                &NoOpProgress,
            )
            .expect("import")
        })
    });
}

criterion_group!(benches, benchmark_import);
criterion_main!(benches);
