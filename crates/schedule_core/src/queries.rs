use serde::Serialize;

use transit_schedule_model::{wall_clock, GtfsTime, Route, Trip, WheelchairBoarding};

use crate::error::NotFoundError;
use crate::store::Dataset;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSummary {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub wheelchair_boarding: WheelchairBoarding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStop {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_sequence: u32,
    #[serde(serialize_with = "wall_clock::serialize")]
    pub arrival_time: GtfsTime,
    pub arrival_day_offset: u32,
    #[serde(serialize_with = "wall_clock::serialize")]
    pub departure_time: GtfsTime,
    pub departure_day_offset: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetails {
    pub trip: Trip,
    pub route: Option<Route>,
    pub stops: Vec<TripStop>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopDeparture {
    pub trip_id: String,
    pub route_short_name: String,
    pub trip_headsign: String,
    pub stop_sequence: u32,
    #[serde(serialize_with = "wall_clock::serialize")]
    pub departure_time: GtfsTime,
    pub departure_day_offset: u32,
}

/// Stops in file order.
pub fn stops(dataset: &Dataset) -> Vec<StopSummary> {
    dataset
        .stops()
        .iter()
        .map(|stop| StopSummary {
            stop_id: stop.stop_id.clone(),
            stop_name: stop.stop_name.clone(),
            stop_lat: stop.stop_lat,
            stop_lon: stop.stop_lon,
            wheelchair_boarding: stop.wheelchair_boarding,
        })
        .collect()
}

pub fn trip(dataset: &Dataset, trip_id: &str) -> Result<TripDetails, NotFoundError> {
    let trip = dataset
        .trip(trip_id)
        .ok_or_else(|| NotFoundError::new("trip", trip_id))?;
    let stops = dataset
        .trip_stop_times(trip_id)
        .map(|entry| TripStop {
            stop_id: entry.stop_id.clone(),
            stop_name: dataset
                .stop(&entry.stop_id)
                .map(|stop| stop.stop_name.clone())
                .unwrap_or_default(),
            stop_sequence: entry.stop_sequence,
            arrival_time: entry.arrival_time,
            arrival_day_offset: entry.arrival_time.day_offset(),
            departure_time: entry.departure_time,
            departure_day_offset: entry.departure_time.day_offset(),
        })
        .collect();

    Ok(TripDetails {
        trip: trip.clone(),
        route: dataset.route(&trip.route_id).cloned(),
        stops,
    })
}

/// Every departure at a stop, ordered by departure time then trip id.
pub fn departures(dataset: &Dataset, stop_id: &str) -> Result<Vec<StopDeparture>, NotFoundError> {
    if dataset.stop(stop_id).is_none() {
        return Err(NotFoundError::new("stop", stop_id));
    }
    Ok(dataset
        .departures_from(stop_id, GtfsTime::default())
        .map(|entry| {
            let trip = dataset.trip(&entry.trip_id);
            StopDeparture {
                trip_id: entry.trip_id.clone(),
                route_short_name: trip
                    .and_then(|trip| dataset.route(&trip.route_id))
                    .map(|route| route.route_short_name.clone())
                    .unwrap_or_default(),
                trip_headsign: trip
                    .map(|trip| trip.trip_headsign.clone())
                    .unwrap_or_default(),
                stop_sequence: entry.stop_sequence,
                departure_time: entry.departure_time,
                departure_day_offset: entry.departure_time.day_offset(),
            }
        })
        .collect())
}
