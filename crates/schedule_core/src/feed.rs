use crate::records::{ColumnSpec, TableSchema};

pub const AGENCY_FILE: &str = "agency.txt";
pub const STOPS_FILE: &str = "stops.txt";
pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const CALENDAR_DATES_FILE: &str = "calendar_dates.txt";

/// Files an archive must contain, in load order.
pub const REQUIRED_FILES: &[&str] = &[
    AGENCY_FILE,
    STOPS_FILE,
    ROUTES_FILE,
    TRIPS_FILE,
    STOP_TIMES_FILE,
    CALENDAR_DATES_FILE,
];

pub const DEFAULT_AGENCY_ID: &str = "default";
pub const DEFAULT_AGENCY_LANG: &str = "en";

pub const AGENCY_SCHEMA: TableSchema = TableSchema {
    file: AGENCY_FILE,
    columns: &[
        ColumnSpec::optional("agency_id"),
        ColumnSpec::required("agency_name"),
        ColumnSpec::required("agency_url"),
        ColumnSpec::required("agency_timezone"),
        ColumnSpec::optional("agency_lang"),
    ],
};

pub const STOPS_SCHEMA: TableSchema = TableSchema {
    file: STOPS_FILE,
    columns: &[
        ColumnSpec::required("stop_id"),
        ColumnSpec::required("stop_name"),
        ColumnSpec::required("stop_lat"),
        ColumnSpec::required("stop_lon"),
        ColumnSpec::optional("wheelchair_boarding"),
    ],
};

pub const ROUTES_SCHEMA: TableSchema = TableSchema {
    file: ROUTES_FILE,
    columns: &[
        ColumnSpec::required("route_id"),
        ColumnSpec::optional("agency_id"),
        ColumnSpec::optional("route_short_name"),
        ColumnSpec::optional("route_long_name"),
        ColumnSpec::required("route_type"),
        ColumnSpec::optional("route_color"),
        ColumnSpec::optional("route_text_color"),
    ],
};

pub const TRIPS_SCHEMA: TableSchema = TableSchema {
    file: TRIPS_FILE,
    columns: &[
        ColumnSpec::required("route_id"),
        ColumnSpec::required("service_id"),
        ColumnSpec::required("trip_id"),
        ColumnSpec::optional("trip_headsign"),
        ColumnSpec::optional("trip_short_name"),
        ColumnSpec::optional("direction_id"),
        ColumnSpec::optional("shape_id"),
        ColumnSpec::optional("wheelchair_accessible"),
        ColumnSpec::optional("bikes_allowed"),
    ],
};

pub const STOP_TIMES_SCHEMA: TableSchema = TableSchema {
    file: STOP_TIMES_FILE,
    columns: &[
        ColumnSpec::required("trip_id"),
        ColumnSpec::required("arrival_time"),
        ColumnSpec::required("departure_time"),
        ColumnSpec::required("stop_id"),
        ColumnSpec::required("stop_sequence"),
    ],
};

pub const CALENDAR_DATES_SCHEMA: TableSchema = TableSchema {
    file: CALENDAR_DATES_FILE,
    columns: &[
        ColumnSpec::required("service_id"),
        ColumnSpec::required("date"),
        ColumnSpec::required("exception_type"),
    ],
};
