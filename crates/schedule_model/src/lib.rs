use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const SECONDS_PER_DAY: u32 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum GtfsParseError {
    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),
    #[error("invalid date value: {0}")]
    InvalidDateValue(String),
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("invalid time value: {0}")]
    InvalidTimeValue(String),
    #[error("invalid color format: {0}")]
    InvalidColorFormat(String),
}

/// A calendar date written as `YYYYMMDD` in feed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GtfsDate(NaiveDate);

impl GtfsDate {
    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        if trimmed.len() != 8 || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(GtfsParseError::InvalidDateFormat(value.to_string()));
        }

        let year: i32 = trimmed[0..4]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;
        let month: u32 = trimmed[4..6]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;
        let day: u32 = trimmed[6..8]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;

        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| GtfsParseError::InvalidDateValue(value.to_string()))
    }

    pub fn naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for GtfsDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for GtfsDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

impl Serialize for GtfsDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GtfsDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GtfsDateVisitor;

        impl<'de> Visitor<'de> for GtfsDateVisitor {
            type Value = GtfsDate;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a GTFS date in YYYYMMDD format")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<GtfsDate, E> {
                GtfsDate::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(GtfsDateVisitor)
    }
}

/// Time on the service-day clock.
///
/// Feeds write trips that run past midnight with hours of 24 and above
/// (`25:10:00` is 01:10 on the next calendar day). The full value is kept so
/// ordering within a service day stays correct; [`GtfsTime::wall_clock`] and
/// [`GtfsTime::day_offset`] split it into the normalized 0-23h time and the
/// number of days past the service date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GtfsTime {
    total_seconds: u32,
}

impl GtfsTime {
    pub fn from_seconds(total_seconds: u32) -> Self {
        Self { total_seconds }
    }

    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            total_seconds: hours * 3600 + minutes * 60 + seconds,
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            total_seconds: time.num_seconds_from_midnight(),
        }
    }

    /// Accepts `H:MM:SS` and `H:MM`; hours may exceed 23.
    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(GtfsParseError::InvalidTimeFormat(value.to_string()));
        }

        let hours: u32 = parts[0]
            .parse()
            .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?;
        let minutes: u32 = parts[1]
            .parse()
            .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?;
        let seconds: u32 = match parts.get(2) {
            Some(part) => part
                .parse()
                .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?,
            None => 0,
        };

        if minutes > 59 || seconds > 59 || hours > 167 {
            return Err(GtfsParseError::InvalidTimeValue(value.to_string()));
        }

        Ok(Self::from_hms(hours, minutes, seconds))
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    pub fn hours(&self) -> u32 {
        self.total_seconds / 3600
    }

    pub fn minutes(&self) -> u32 {
        (self.total_seconds % 3600) / 60
    }

    pub fn seconds(&self) -> u32 {
        self.total_seconds % 60
    }

    /// Whole days past the service date (0 for times before 24:00:00).
    pub fn day_offset(&self) -> u32 {
        self.total_seconds / SECONDS_PER_DAY
    }

    /// Clock time with hours reduced into 0-23.
    pub fn wall_clock(&self) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(self.total_seconds % SECONDS_PER_DAY, 0)
            .unwrap_or_default()
    }
}

impl fmt::Display for GtfsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.seconds()
        )
    }
}

impl Serialize for GtfsTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GtfsTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GtfsTimeVisitor;

        impl<'de> Visitor<'de> for GtfsTimeVisitor {
            type Value = GtfsTime;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a GTFS time in HH:MM:SS format")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<GtfsTime, E> {
                GtfsTime::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(GtfsTimeVisitor)
    }
}

/// Serializes a [`GtfsTime`] as its normalized `HH:MM:SS` wall-clock time.
///
/// For `#[serde(serialize_with = "wall_clock::serialize")]` on query output,
/// next to a field carrying [`GtfsTime::day_offset`].
pub mod wall_clock {
    use serde::Serializer;

    use super::GtfsTime;

    pub fn serialize<S: Serializer>(time: &GtfsTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.wall_clock().format("%H:%M:%S"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GtfsColor {
    rgb: u32,
}

impl GtfsColor {
    pub const WHITE: GtfsColor = GtfsColor { rgb: 0xFFFFFF };
    pub const BLACK: GtfsColor = GtfsColor { rgb: 0x000000 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self {
            rgb: (r as u32) << 16 | (g as u32) << 8 | (b as u32),
        }
    }

    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        if trimmed.len() != 6 || !trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(GtfsParseError::InvalidColorFormat(value.to_string()));
        }

        let rgb = u32::from_str_radix(trimmed, 16)
            .map_err(|_| GtfsParseError::InvalidColorFormat(value.to_string()))?;
        Ok(Self { rgb })
    }

    pub fn rgb(&self) -> u32 {
        self.rgb
    }
}

impl fmt::Display for GtfsColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.rgb)
    }
}

impl Serialize for GtfsColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u8")]
pub enum WheelchairBoarding {
    #[default]
    NoInfo,
    Accessible,
    NotPossible,
}

impl WheelchairBoarding {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NoInfo),
            1 => Some(Self::Accessible),
            2 => Some(Self::NotPossible),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::NoInfo => 0,
            Self::Accessible => 1,
            Self::NotPossible => 2,
        }
    }
}

impl From<WheelchairBoarding> for u8 {
    fn from(value: WheelchairBoarding) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "i32")]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
    Trolleybus,
    Monorail,
    Extended(u16),
    Unknown(i32),
}

impl RouteType {
    pub fn from_code(value: i32) -> Self {
        match value {
            0 => RouteType::Tram,
            1 => RouteType::Subway,
            2 => RouteType::Rail,
            3 => RouteType::Bus,
            4 => RouteType::Ferry,
            5 => RouteType::CableCar,
            6 => RouteType::Gondola,
            7 => RouteType::Funicular,
            11 => RouteType::Trolleybus,
            12 => RouteType::Monorail,
            100..=1702 => RouteType::Extended(value as u16),
            other => RouteType::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            RouteType::Tram => 0,
            RouteType::Subway => 1,
            RouteType::Rail => 2,
            RouteType::Bus => 3,
            RouteType::Ferry => 4,
            RouteType::CableCar => 5,
            RouteType::Gondola => 6,
            RouteType::Funicular => 7,
            RouteType::Trolleybus => 11,
            RouteType::Monorail => 12,
            RouteType::Extended(value) => value as i32,
            RouteType::Unknown(value) => value,
        }
    }
}

impl From<RouteType> for i32 {
    fn from(value: RouteType) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u8")]
pub enum DirectionId {
    #[default]
    Outbound,
    Inbound,
}

impl DirectionId {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Outbound),
            1 => Some(Self::Inbound),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Outbound => 0,
            Self::Inbound => 1,
        }
    }
}

impl From<DirectionId> for u8 {
    fn from(value: DirectionId) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u8")]
pub enum WheelchairAccessible {
    #[default]
    NoInfo,
    Accessible,
    NotAccessible,
}

impl WheelchairAccessible {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NoInfo),
            1 => Some(Self::Accessible),
            2 => Some(Self::NotAccessible),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::NoInfo => 0,
            Self::Accessible => 1,
            Self::NotAccessible => 2,
        }
    }
}

impl From<WheelchairAccessible> for u8 {
    fn from(value: WheelchairAccessible) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u8")]
pub enum BikesAllowed {
    #[default]
    NoInfo,
    Allowed,
    NotAllowed,
}

impl BikesAllowed {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NoInfo),
            1 => Some(Self::Allowed),
            2 => Some(Self::NotAllowed),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::NoInfo => 0,
            Self::Allowed => 1,
            Self::NotAllowed => 2,
        }
    }
}

impl From<BikesAllowed> for u8 {
    fn from(value: BikesAllowed) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u8")]
pub enum ExceptionType {
    Added,
    Removed,
}

impl ExceptionType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Added),
            2 => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Added => 1,
            Self::Removed => 2,
        }
    }
}

impl From<ExceptionType> for u8 {
    fn from(value: ExceptionType) -> Self {
        value.code()
    }
}

/// Surrogate id of one imported dataset version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    Importing,
    Imported,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetVersion {
    pub id: VersionId,
    pub filename: String,
    pub uploaded_by: i64,
    pub uploaded_at: DateTime<Utc>,
    pub active: bool,
    pub state: VersionState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agency {
    pub dataset_version_id: VersionId,
    pub agency_id: String,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_lang: String,
    pub agency_timezone: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub dataset_version_id: VersionId,
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub wheelchair_boarding: WheelchairBoarding,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub dataset_version_id: VersionId,
    pub route_id: String,
    /// `None` when the referenced agency is not part of the version.
    pub agency_id: Option<String>,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_type: RouteType,
    pub route_color: GtfsColor,
    pub route_text_color: GtfsColor,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub dataset_version_id: VersionId,
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub trip_headsign: String,
    pub trip_short_name: String,
    pub direction_id: DirectionId,
    pub shape_id: Option<String>,
    pub wheelchair_accessible: WheelchairAccessible,
    pub bikes_allowed: BikesAllowed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTimeEntry {
    pub id: u64,
    pub dataset_version_id: VersionId,
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival_time: GtfsTime,
    pub departure_time: GtfsTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarException {
    pub id: u64,
    pub dataset_version_id: VersionId,
    pub service_id: String,
    pub date: GtfsDate,
    pub exception_type: ExceptionType,
}
