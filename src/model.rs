use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A point in time in the reference timezone — the only time type.
pub type Instant = DateTime<Tz>;

/// Parse an ISO 8601 timestamp into the reference zone.
///
/// Accepts RFC 3339 with an offset (converted), a naive date-time with `T` or
/// space separator (taken as local wall-clock time) and a bare date (local
/// midnight). Returns None when nothing matches or the local time does not exist.
pub fn parse_instant(raw: &str, tz: Tz) -> Option<Instant> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&tz));
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })?;
    tz.from_local_datetime(&naive).earliest()
}

/// Closed pair `[from, to]` with `from <= to`. Occupied slot on input, free slot on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub from: Instant,
    pub to: Instant,
}

impl Interval {
    pub fn new(from: Instant, to: Instant) -> Self {
        debug_assert!(from <= to, "Interval from must not be after to");
        Self { from, to }
    }
}

/// A scheduled event blocking a room, as delivered by the upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyRecord {
    pub start: Instant,
    pub end: Instant,
    pub room: String,
}

impl OccupancyRecord {
    pub fn new(start: Instant, end: Instant, room: impl Into<String>) -> Self {
        Self {
            start,
            end,
            room: room.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomCategory {
    Seminar,
    Computer,
    /// Teacher-only rooms; returned on request and open longer.
    Restricted,
    Unknown,
}

impl RoomCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomCategory::Seminar => "seminar",
            RoomCategory::Computer => "computer",
            RoomCategory::Restricted => "restricted",
            RoomCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RoomCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free intervals of one room, chronological.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAvailability {
    pub room: String,
    pub category: RoomCategory,
    pub intervals: Vec<Interval>,
}

/// Per-room free intervals for one day, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    rooms: Vec<RoomAvailability>,
}

impl Availability {
    pub fn new(rooms: Vec<RoomAvailability>) -> Self {
        Self { rooms }
    }

    pub fn get(&self, room: &str) -> Option<&[Interval]> {
        self.rooms
            .iter()
            .find(|r| r.room == room)
            .map(|r| r.intervals.as_slice())
    }

    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.iter().any(|r| r.room == room)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomAvailability> {
        self.rooms.iter()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Cache identity of a computed day: value equality on both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub date: NaiveDate,
    pub include_restricted: bool,
}

impl CacheKey {
    pub fn new(date: NaiveDate, include_restricted: bool) -> Self {
        Self {
            date,
            include_restricted,
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────

/// One `{from, to}` pair of the `/api/freeRooms` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalReport {
    pub from: String,
    pub to: String,
}

/// One room entry of the `/api/freeRooms` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomReport {
    pub room: String,
    #[serde(rename = "type")]
    pub category: RoomCategory,
    pub availability: Vec<IntervalReport>,
}

impl From<&Interval> for IntervalReport {
    fn from(interval: &Interval) -> Self {
        Self {
            from: interval.from.to_rfc3339(),
            to: interval.to.to_rfc3339(),
        }
    }
}

impl From<&RoomAvailability> for RoomReport {
    fn from(room: &RoomAvailability) -> Self {
        Self {
            room: room.room.clone(),
            category: room.category,
            availability: room.intervals.iter().map(IntervalReport::from).collect(),
        }
    }
}

/// Flatten an availability into the response array.
pub fn report(availability: &Availability) -> Vec<RoomReport> {
    availability.rooms().map(RoomReport::from).collect()
}
