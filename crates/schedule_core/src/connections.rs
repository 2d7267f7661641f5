//! Single-trip connection search over one dataset.

use chrono::NaiveDate;
use serde::Serialize;

use transit_schedule_model::{wall_clock, BikesAllowed, GtfsTime, WheelchairAccessible};

use crate::store::Dataset;

pub const DEFAULT_CONNECTION_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionQuery {
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub date: NaiveDate,
    pub time: GtfsTime,
    pub limit: usize,
}

impl ConnectionQuery {
    pub fn new(
        from_stop_id: impl Into<String>,
        to_stop_id: impl Into<String>,
        date: NaiveDate,
        time: GtfsTime,
    ) -> Self {
        Self {
            from_stop_id: from_stop_id.into(),
            to_stop_id: to_stop_id.into(),
            date,
            time,
            limit: DEFAULT_CONNECTION_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One boarding at the origin and the alighting at the destination.
///
/// Times serialize as wall-clock `HH:MM:SS` with the days past the query
/// date in the matching `*DayOffset` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub trip_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub from_stop_name: String,
    pub to_stop_name: String,
    #[serde(serialize_with = "wall_clock::serialize")]
    pub departure_time: GtfsTime,
    pub departure_day_offset: u32,
    #[serde(serialize_with = "wall_clock::serialize")]
    pub arrival_time: GtfsTime,
    pub arrival_day_offset: u32,
    pub wheelchair_accessible: WheelchairAccessible,
    pub bikes_allowed: BikesAllowed,
}

/// Trips leaving `from_stop_id` at or after the query time on the query date
/// that later call at `to_stop_id`, earliest departure first.
///
/// Departures are compared on the service-day clock, so a `25:10:00`
/// departure sorts after `23:30:00` on the same service date.
pub fn find_connections(dataset: &Dataset, query: &ConnectionQuery) -> Vec<Connection> {
    if query.limit == 0 {
        return Vec::new();
    }
    let Some(from_stop) = dataset.stop(&query.from_stop_id) else {
        return Vec::new();
    };
    let Some(to_stop) = dataset.stop(&query.to_stop_id) else {
        return Vec::new();
    };

    dataset
        .departures_from(&query.from_stop_id, query.time)
        .filter_map(|departure| {
            let trip = dataset.trip(&departure.trip_id)?;
            if !dataset.runs_on(&trip.service_id, query.date) {
                return None;
            }
            let arrival = dataset.trip_stop_times(&trip.trip_id).find(|entry| {
                entry.stop_sequence > departure.stop_sequence && entry.stop_id == query.to_stop_id
            })?;
            let route = dataset.route(&trip.route_id);

            Some(Connection {
                trip_id: trip.trip_id.clone(),
                route_short_name: route
                    .map(|route| route.route_short_name.clone())
                    .unwrap_or_default(),
                route_long_name: route
                    .map(|route| route.route_long_name.clone())
                    .unwrap_or_default(),
                from_stop_name: from_stop.stop_name.clone(),
                to_stop_name: to_stop.stop_name.clone(),
                departure_time: departure.departure_time,
                departure_day_offset: departure.departure_time.day_offset(),
                arrival_time: arrival.arrival_time,
                arrival_day_offset: arrival.arrival_time.day_offset(),
                wheelchair_accessible: trip.wheelchair_accessible,
                bikes_allowed: trip.bikes_allowed,
            })
        })
        .take(query.limit)
        .collect()
}
