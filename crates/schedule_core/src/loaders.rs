//! Per-file loaders turning parsed records into store rows.
//!
//! Every loader folds over its records, counting loaded and skipped rows and
//! collecting notices. Rows that fail are skipped; only header problems end a
//! load.

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info, warn};

use transit_schedule_model::{
    Agency, BikesAllowed, CalendarException, DirectionId, ExceptionType, GtfsColor, GtfsDate,
    GtfsTime, Route, RouteType, Stop, StopTimeEntry, Trip, VersionId, WheelchairAccessible,
    WheelchairBoarding,
};

use crate::feed::{
    AGENCY_SCHEMA, CALENDAR_DATES_SCHEMA, DEFAULT_AGENCY_ID, DEFAULT_AGENCY_LANG, ROUTES_SCHEMA,
    STOPS_SCHEMA, STOP_TIMES_SCHEMA, TRIPS_SCHEMA,
};
use crate::notice::{ImportNotice, NoticeContainer};
use crate::records::{HeaderError, Record, RecordReader, TableSchema};
use crate::store::{BatchWriter, StoreRow, Table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLoadSummary {
    pub file: String,
    pub loaded: usize,
    pub skipped: usize,
}

pub struct LoadedTable<T> {
    pub table: Table<T>,
    pub summary: EntityLoadSummary,
    pub notices: NoticeContainer,
}

pub struct LoadTally<T> {
    file: &'static str,
    writer: BatchWriter<T>,
    loaded: usize,
    skipped: usize,
    notices: NoticeContainer,
}

impl<T: StoreRow> LoadTally<T> {
    fn new(file: &'static str, batch_size: usize) -> Self {
        Self {
            file,
            writer: BatchWriter::new(file, batch_size),
            loaded: 0,
            skipped: 0,
            notices: NoticeContainer::new(),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.writer.next_id()
    }

    fn skip(&mut self, notice: ImportNotice) {
        self.skipped += 1;
        self.note(notice);
    }

    /// Records a notice; logging drops to `debug` once the file's cap is hit.
    pub fn note(&mut self, notice: ImportNotice) {
        let code = notice.code.clone();
        let row = notice.row;
        let field = notice.field.clone();
        let message = notice.message.clone();
        let is_skip = notice.is_row_skip();

        if !self.notices.push(notice) {
            debug!(file = self.file, row, code = %code, "{message}");
        } else if is_skip {
            warn!(file = self.file, row, field = ?field, code = %code, "{message}");
        } else {
            info!(file = self.file, row, field = ?field, code = %code, "{message}");
        }
    }

    fn accept(&mut self, row: T, key_field: &str, row_number: u64) {
        if let Some(key) = row.natural_key() {
            if self.writer.contains_key(key) {
                let notice = ImportNotice::duplicate_key(self.file, key_field, row_number, key);
                self.skip(notice);
                return;
            }
        }
        self.writer.insert(row);
        self.loaded += 1;
    }

    fn finish(self) -> LoadedTable<T> {
        let summary = EntityLoadSummary {
            file: self.file.to_string(),
            loaded: self.loaded,
            skipped: self.skipped,
        };
        info!(
            file = self.file,
            loaded = summary.loaded,
            skipped = summary.skipped,
            batches = self.writer.batches(),
            "file loaded"
        );
        LoadedTable {
            table: self.writer.finish(),
            summary,
            notices: self.notices,
        }
    }
}

/// Folds all records of one file into a table.
///
/// `key_field` names the natural-key column reported on duplicates.
fn load_table<T, F>(
    schema: TableSchema,
    text: &str,
    batch_size: usize,
    key_field: &'static str,
    mut build: F,
) -> Result<LoadedTable<T>, HeaderError>
where
    T: StoreRow,
    F: FnMut(&Record, &mut LoadTally<T>) -> Result<T, ImportNotice>,
{
    let reader = RecordReader::new(schema, text)?;
    let tally = reader.fold(LoadTally::new(schema.file, batch_size), |mut tally, item| {
        match item {
            Ok(record) => match build(&record, &mut tally) {
                Ok(row) => tally.accept(row, key_field, record.row_number()),
                Err(notice) => tally.skip(notice),
            },
            Err(err) => {
                let notice = ImportNotice::from_record_error(schema.file, &err);
                tally.skip(notice);
            }
        }
        tally
    });
    Ok(tally.finish())
}

fn color_or_default<T: StoreRow>(
    record: &Record,
    field: &'static str,
    default: GtfsColor,
    tally: &mut LoadTally<T>,
) -> GtfsColor {
    match record.get(field) {
        None => default,
        Some(value) => GtfsColor::parse(value).unwrap_or_else(|_| {
            tally.note(ImportNotice::default_applied(
                tally.file,
                field,
                record.row_number(),
                value,
                &default.to_string(),
            ));
            default
        }),
    }
}

/// Reads a small integer flag, falling back to `default` when absent or
/// outside the known codes.
fn flag_or_default<T: StoreRow, V: Copy>(
    record: &Record,
    field: &'static str,
    from_code: fn(i64) -> Option<V>,
    default: V,
    tally: &mut LoadTally<T>,
) -> V {
    let Some(value) = record.get(field) else {
        return default;
    };
    match value.parse::<i64>().ok().and_then(from_code) {
        Some(flag) => flag,
        None => {
            tally.note(ImportNotice::default_applied(
                tally.file,
                field,
                record.row_number(),
                value,
                "0",
            ));
            default
        }
    }
}

fn invalid(record: &Record, file: &str, field: &'static str) -> ImportNotice {
    ImportNotice::invalid_value(
        file,
        field,
        record.row_number(),
        record.get(field).unwrap_or_default(),
    )
}

pub fn load_agencies(
    text: &str,
    version: VersionId,
    batch_size: usize,
) -> Result<LoadedTable<Agency>, HeaderError> {
    load_table(AGENCY_SCHEMA, text, batch_size, "agency_id", |record, _| {
        Ok(Agency {
            dataset_version_id: version,
            agency_id: record.get_or("agency_id", DEFAULT_AGENCY_ID).to_string(),
            agency_name: record.required("agency_name")?.to_string(),
            agency_url: record.required("agency_url")?.to_string(),
            agency_lang: record.get_or("agency_lang", DEFAULT_AGENCY_LANG).to_string(),
            agency_timezone: record.required("agency_timezone")?.to_string(),
        })
    })
}

pub fn load_stops(
    text: &str,
    version: VersionId,
    batch_size: usize,
) -> Result<LoadedTable<Stop>, HeaderError> {
    let file = STOPS_SCHEMA.file;
    load_table(STOPS_SCHEMA, text, batch_size, "stop_id", |record, tally| {
        let stop_lat = record
            .parse::<f64>("stop_lat")
            .ok_or_else(|| invalid(record, file, "stop_lat"))?;
        let stop_lon = record
            .parse::<f64>("stop_lon")
            .ok_or_else(|| invalid(record, file, "stop_lon"))?;
        Ok(Stop {
            dataset_version_id: version,
            stop_id: record.required("stop_id")?.to_string(),
            stop_name: record.required("stop_name")?.to_string(),
            stop_lat,
            stop_lon,
            wheelchair_boarding: flag_or_default(
                record,
                "wheelchair_boarding",
                WheelchairBoarding::from_code,
                WheelchairBoarding::NoInfo,
                tally,
            ),
        })
    })
}

/// Routes whose agency is unknown are kept with no agency.
pub fn load_routes(
    text: &str,
    version: VersionId,
    batch_size: usize,
    agencies: &Table<Agency>,
) -> Result<LoadedTable<Route>, HeaderError> {
    let file = ROUTES_SCHEMA.file;
    load_table(ROUTES_SCHEMA, text, batch_size, "route_id", |record, tally| {
        let route_type = record
            .parse::<i32>("route_type")
            .map(RouteType::from_code)
            .ok_or_else(|| invalid(record, file, "route_type"))?;
        let agency_key = record.get_or("agency_id", DEFAULT_AGENCY_ID);
        let agency_id = if agencies.contains_key(agency_key) {
            Some(agency_key.to_string())
        } else {
            debug!(file, row = record.row_number(), agency_id = agency_key, "route agency not found");
            None
        };
        Ok(Route {
            dataset_version_id: version,
            route_id: record.required("route_id")?.to_string(),
            agency_id,
            route_short_name: record.get_or("route_short_name", "").to_string(),
            route_long_name: record.get_or("route_long_name", "").to_string(),
            route_type,
            route_color: color_or_default(record, "route_color", GtfsColor::WHITE, tally),
            route_text_color: color_or_default(
                record,
                "route_text_color",
                GtfsColor::BLACK,
                tally,
            ),
        })
    })
}

pub fn load_trips(
    text: &str,
    version: VersionId,
    batch_size: usize,
    routes: &Table<Route>,
) -> Result<LoadedTable<Trip>, HeaderError> {
    let file = TRIPS_SCHEMA.file;
    load_table(TRIPS_SCHEMA, text, batch_size, "trip_id", |record, tally| {
        let route_id = record.required("route_id")?;
        if !routes.contains_key(route_id) {
            return Err(ImportNotice::foreign_key(
                file,
                "route_id",
                record.row_number(),
                route_id,
            ));
        }
        Ok(Trip {
            dataset_version_id: version,
            trip_id: record.required("trip_id")?.to_string(),
            route_id: route_id.to_string(),
            service_id: record.required("service_id")?.to_string(),
            trip_headsign: record.get_or("trip_headsign", "").to_string(),
            trip_short_name: record.get_or("trip_short_name", "").to_string(),
            direction_id: flag_or_default(
                record,
                "direction_id",
                DirectionId::from_code,
                DirectionId::Outbound,
                tally,
            ),
            shape_id: record.get("shape_id").map(str::to_string),
            wheelchair_accessible: flag_or_default(
                record,
                "wheelchair_accessible",
                WheelchairAccessible::from_code,
                WheelchairAccessible::NoInfo,
                tally,
            ),
            bikes_allowed: flag_or_default(
                record,
                "bikes_allowed",
                BikesAllowed::from_code,
                BikesAllowed::NoInfo,
                tally,
            ),
        })
    })
}

/// Stop-time rows need both their trip and their stop; a repeated
/// `(trip_id, stop_sequence)` pair keeps the first row.
pub fn load_stop_times(
    text: &str,
    version: VersionId,
    batch_size: usize,
    trips: &Table<Trip>,
    stops: &Table<Stop>,
) -> Result<LoadedTable<StopTimeEntry>, HeaderError> {
    let file = STOP_TIMES_SCHEMA.file;
    let mut seen: FxHashSet<(String, u32)> = FxHashSet::default();
    load_table(STOP_TIMES_SCHEMA, text, batch_size, "", |record, tally| {
        let row = record.row_number();
        let trip_id = record.required("trip_id")?;
        if !trips.contains_key(trip_id) {
            return Err(ImportNotice::foreign_key(file, "trip_id", row, trip_id));
        }
        let stop_id = record.required("stop_id")?;
        if !stops.contains_key(stop_id) {
            return Err(ImportNotice::foreign_key(file, "stop_id", row, stop_id));
        }
        let stop_sequence = record
            .parse::<u32>("stop_sequence")
            .ok_or_else(|| invalid(record, file, "stop_sequence"))?;
        let arrival_time = GtfsTime::parse(record.required("arrival_time")?)
            .map_err(|_| invalid(record, file, "arrival_time"))?;
        let departure_time = GtfsTime::parse(record.required("departure_time")?)
            .map_err(|_| invalid(record, file, "departure_time"))?;

        if !seen.insert((trip_id.to_string(), stop_sequence)) {
            return Err(ImportNotice::duplicate_key(
                file,
                "stop_sequence",
                row,
                &format!("{trip_id}/{stop_sequence}"),
            ));
        }

        Ok(StopTimeEntry {
            id: tally.next_id(),
            dataset_version_id: version,
            trip_id: trip_id.to_string(),
            stop_id: stop_id.to_string(),
            stop_sequence,
            arrival_time,
            departure_time,
        })
    })
}

pub fn load_calendar_dates(
    text: &str,
    version: VersionId,
    batch_size: usize,
) -> Result<LoadedTable<CalendarException>, HeaderError> {
    let file = CALENDAR_DATES_SCHEMA.file;
    load_table(CALENDAR_DATES_SCHEMA, text, batch_size, "", |record, tally| {
        let date = GtfsDate::parse(record.required("date")?)
            .map_err(|_| invalid(record, file, "date"))?;
        let exception_type = record
            .parse::<i64>("exception_type")
            .and_then(ExceptionType::from_code)
            .ok_or_else(|| invalid(record, file, "exception_type"))?;
        Ok(CalendarException {
            id: tally.next_id(),
            dataset_version_id: version,
            service_id: record.required("service_id")?.to_string(),
            date,
            exception_type,
        })
    })
}
