//! In-memory relational store for one dataset version.

use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use transit_schedule_model::{
    Agency, CalendarException, ExceptionType, GtfsTime, Route, Stop, StopTimeEntry, Trip,
    VersionId,
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Row type stored in a [`Table`]; rows with a natural key are indexed by it.
pub trait StoreRow {
    fn natural_key(&self) -> Option<&str> {
        None
    }
}

impl StoreRow for Agency {
    fn natural_key(&self) -> Option<&str> {
        Some(&self.agency_id)
    }
}

impl StoreRow for Stop {
    fn natural_key(&self) -> Option<&str> {
        Some(&self.stop_id)
    }
}

impl StoreRow for Route {
    fn natural_key(&self) -> Option<&str> {
        Some(&self.route_id)
    }
}

impl StoreRow for Trip {
    fn natural_key(&self) -> Option<&str> {
        Some(&self.trip_id)
    }
}

impl StoreRow for StopTimeEntry {}

impl StoreRow for CalendarException {}

#[derive(Debug, Clone)]
pub struct Table<T> {
    rows: Vec<T>,
    index: FxHashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<T: StoreRow> Table<T> {
    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&position| &self.rows[position])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Buffers rows of one table and appends them in fixed-size batches.
///
/// Natural keys are claimed on insert, so a key is visible to lookups before
/// its batch is flushed.
pub struct BatchWriter<T> {
    file: &'static str,
    table: Table<T>,
    pending: Vec<T>,
    batch_size: usize,
    batches: usize,
}

impl<T: StoreRow> BatchWriter<T> {
    pub fn new(file: &'static str, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            file,
            table: Table::default(),
            pending: Vec::with_capacity(batch_size.min(DEFAULT_BATCH_SIZE)),
            batch_size,
            batches: 0,
        }
    }

    /// Surrogate id of the next inserted row, starting at 1.
    pub fn next_id(&self) -> u64 {
        (self.table.rows.len() + self.pending.len()) as u64 + 1
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Returns `false` and drops the row when its natural key is taken.
    pub fn insert(&mut self, row: T) -> bool {
        if let Some(key) = row.natural_key() {
            if self.table.index.contains_key(key) {
                return false;
            }
            let position = self.table.rows.len() + self.pending.len();
            self.table.index.insert(key.to_string(), position);
        }
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            self.flush();
        }
        true
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.batches += 1;
        debug!(
            file = self.file,
            batch = self.batches,
            rows = self.pending.len(),
            "flushing batch"
        );
        self.table.rows.append(&mut self.pending);
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Flushes the partial final batch and hands over the table.
    pub fn finish(mut self) -> Table<T> {
        self.flush();
        self.table
    }
}

/// One complete schedule snapshot with its lookup indexes.
#[derive(Debug)]
pub struct Dataset {
    version: VersionId,
    agencies: Table<Agency>,
    stops: Table<Stop>,
    routes: Table<Route>,
    trips: Table<Trip>,
    stop_times: Vec<StopTimeEntry>,
    calendar_exceptions: Vec<CalendarException>,
    departures_by_stop: FxHashMap<String, Vec<usize>>,
    stop_times_by_trip: FxHashMap<String, Vec<usize>>,
    service_days: FxHashMap<String, FxHashSet<NaiveDate>>,
}

#[derive(Default)]
pub struct DatasetParts {
    pub agencies: Table<Agency>,
    pub stops: Table<Stop>,
    pub routes: Table<Route>,
    pub trips: Table<Trip>,
    pub stop_times: Table<StopTimeEntry>,
    pub calendar_exceptions: Table<CalendarException>,
}

impl Dataset {
    pub fn assemble(version: VersionId, parts: DatasetParts) -> Self {
        let stop_times = parts.stop_times.rows;
        let calendar_exceptions = parts.calendar_exceptions.rows;

        let mut departures_by_stop: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut stop_times_by_trip: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (position, entry) in stop_times.iter().enumerate() {
            departures_by_stop
                .entry(entry.stop_id.clone())
                .or_default()
                .push(position);
            stop_times_by_trip
                .entry(entry.trip_id.clone())
                .or_default()
                .push(position);
        }
        for positions in departures_by_stop.values_mut() {
            positions.sort_by(|&a, &b| {
                let (a, b) = (&stop_times[a], &stop_times[b]);
                a.departure_time
                    .cmp(&b.departure_time)
                    .then_with(|| a.trip_id.cmp(&b.trip_id))
                    .then_with(|| a.stop_sequence.cmp(&b.stop_sequence))
            });
        }
        for positions in stop_times_by_trip.values_mut() {
            positions.sort_by_key(|&position| stop_times[position].stop_sequence);
        }

        let mut service_days: FxHashMap<String, FxHashSet<NaiveDate>> = FxHashMap::default();
        for exception in &calendar_exceptions {
            if exception.exception_type == ExceptionType::Added {
                service_days
                    .entry(exception.service_id.clone())
                    .or_default()
                    .insert(exception.date.naive_date());
            }
        }

        Self {
            version,
            agencies: parts.agencies,
            stops: parts.stops,
            routes: parts.routes,
            trips: parts.trips,
            stop_times,
            calendar_exceptions,
            departures_by_stop,
            stop_times_by_trip,
            service_days,
        }
    }

    pub fn version(&self) -> VersionId {
        self.version
    }

    pub fn agencies(&self) -> &[Agency] {
        self.agencies.rows()
    }

    pub fn agency(&self, agency_id: &str) -> Option<&Agency> {
        self.agencies.get(agency_id)
    }

    pub fn stops(&self) -> &[Stop] {
        self.stops.rows()
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    pub fn routes(&self) -> &[Route] {
        self.routes.rows()
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    pub fn trips(&self) -> &[Trip] {
        self.trips.rows()
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    pub fn stop_times(&self) -> &[StopTimeEntry] {
        &self.stop_times
    }

    pub fn calendar_exceptions(&self) -> &[CalendarException] {
        &self.calendar_exceptions
    }

    /// Departures at a stop no earlier than `from`, ordered by departure time
    /// then trip id.
    pub fn departures_from<'a>(
        &'a self,
        stop_id: &str,
        from: GtfsTime,
    ) -> impl Iterator<Item = &'a StopTimeEntry> + 'a {
        let positions = self
            .departures_by_stop
            .get(stop_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let start =
            positions.partition_point(|&position| self.stop_times[position].departure_time < from);
        positions[start..]
            .iter()
            .map(move |&position| &self.stop_times[position])
    }

    /// Stop-time rows of a trip ordered by stop sequence.
    pub fn trip_stop_times<'a>(
        &'a self,
        trip_id: &str,
    ) -> impl Iterator<Item = &'a StopTimeEntry> + 'a {
        self.stop_times_by_trip
            .get(trip_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&position| &self.stop_times[position])
    }

    /// Whether an "added" calendar exception exists for the service on `date`.
    pub fn runs_on(&self, service_id: &str, date: NaiveDate) -> bool {
        self.service_days
            .get(service_id)
            .is_some_and(|days| days.contains(&date))
    }
}
