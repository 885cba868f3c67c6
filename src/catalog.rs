use std::collections::HashMap;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::model::{Instant, RoomCategory};

pub const SEMINAR_ROOMS: &[&str] = &[
    "T9:301", "T9:302", "T9:343", "T9:346", "T9:347", "TH:A-942", "TH:A-1242", "TH:A-1247",
    "TH:A-1442",
];

pub const COMPUTER_ROOMS: &[&str] = &["T9:303", "T9:345", "T9:348", "T9:349", "T9:350", "T9:351"];

pub const RESTRICTED_ROOMS: &[&str] = &["TH:A-1142", "T9:344", "TH:A-1042", "TH:A-1048", "TK:PU1"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    DuplicateRoom(String),
    InvalidHours {
        opening: Duration,
        closing: Duration,
    },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::DuplicateRoom(room) => {
                write!(f, "room {room} listed in more than one category")
            }
            PolicyError::InvalidHours { opening, closing } => write!(
                f,
                "opening offset {}min must be before closing offset {}min",
                opening.num_minutes(),
                closing.num_minutes()
            ),
        }
    }
}

impl std::error::Error for PolicyError {}

// ── Room catalog ─────────────────────────────────────────────────

/// Static room classification. Lists are disjoint; order is kept for output.
#[derive(Debug, Clone)]
pub struct RoomCatalog {
    rooms: Vec<(String, RoomCategory)>,
    index: HashMap<String, RoomCategory>,
}

impl RoomCatalog {
    pub fn new(
        seminar: &[&str],
        computer: &[&str],
        restricted: &[&str],
    ) -> Result<Self, PolicyError> {
        let mut rooms = Vec::with_capacity(seminar.len() + computer.len() + restricted.len());
        let mut index = HashMap::new();
        let lists = [
            (seminar, RoomCategory::Seminar),
            (computer, RoomCategory::Computer),
            (restricted, RoomCategory::Restricted),
        ];
        for (list, category) in lists {
            for &room in list {
                if index.insert(room.to_string(), category).is_some() {
                    return Err(PolicyError::DuplicateRoom(room.to_string()));
                }
                rooms.push((room.to_string(), category));
            }
        }
        Ok(Self { rooms, index })
    }

    pub fn category_of(&self, room: &str) -> RoomCategory {
        self.index
            .get(room)
            .copied()
            .unwrap_or(RoomCategory::Unknown)
    }

    /// Seminar and computer rooms always; restricted rooms only on request.
    pub fn is_eligible(&self, room: &str, include_restricted: bool) -> bool {
        match self.category_of(room) {
            RoomCategory::Seminar | RoomCategory::Computer => true,
            RoomCategory::Restricted => include_restricted,
            RoomCategory::Unknown => false,
        }
    }

    /// Eligible rooms in catalog order.
    pub fn eligible_rooms(
        &self,
        include_restricted: bool,
    ) -> impl Iterator<Item = (&str, RoomCategory)> {
        self.rooms
            .iter()
            .filter(move |(_, c)| *c != RoomCategory::Restricted || include_restricted)
            .map(|(room, c)| (room.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomCatalog {
    fn default() -> Self {
        Self::new(SEMINAR_ROOMS, COMPUTER_ROOMS, RESTRICTED_ROOMS)
            .unwrap_or_else(|e| unreachable!("built-in catalog is valid: {e}"))
    }
}

// ── Operating hours ──────────────────────────────────────────────

/// Offsets from local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingHours {
    pub opening: Duration,
    pub closing_normal: Duration,
    pub closing_restricted: Duration,
}

impl OperatingHours {
    pub fn new(
        opening: Duration,
        closing_normal: Duration,
        closing_restricted: Duration,
    ) -> Result<Self, PolicyError> {
        for closing in [closing_normal, closing_restricted] {
            if opening >= closing {
                return Err(PolicyError::InvalidHours { opening, closing });
            }
        }
        Ok(Self {
            opening,
            closing_normal,
            closing_restricted,
        })
    }

    pub fn closing_for(&self, category: RoomCategory) -> Duration {
        match category {
            RoomCategory::Restricted => self.closing_restricted,
            _ => self.closing_normal,
        }
    }
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self {
            opening: Duration::hours(6),
            closing_normal: Duration::hours(20),
            closing_restricted: Duration::hours(22),
        }
    }
}

/// Wall-clock `date + offset` in `tz`. A time falling into a DST gap resolves
/// as if the offset were applied in UTC.
pub fn local_instant(tz: Tz, date: NaiveDate, offset: Duration) -> Instant {
    let naive = date.and_time(NaiveTime::MIN) + offset;
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

// ── Policy ───────────────────────────────────────────────────────

/// Catalog + hours + reference timezone. Built once at startup, shared read-only.
#[derive(Debug, Clone)]
pub struct RoomPolicy {
    pub catalog: RoomCatalog,
    pub hours: OperatingHours,
    pub tz: Tz,
}

impl RoomPolicy {
    pub fn new(catalog: RoomCatalog, hours: OperatingHours, tz: Tz) -> Self {
        Self { catalog, hours, tz }
    }

    pub fn opening(&self, date: NaiveDate) -> Instant {
        local_instant(self.tz, date, self.hours.opening)
    }

    pub fn closing(&self, date: NaiveDate, category: RoomCategory) -> Instant {
        local_instant(self.tz, date, self.hours.closing_for(category))
    }
}

impl Default for RoomPolicy {
    fn default() -> Self {
        Self::new(RoomCatalog::default(), OperatingHours::default(), chrono_tz::CET)
    }
}
