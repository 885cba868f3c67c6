use std::collections::HashMap;

use chrono::NaiveDate;

use crate::catalog::RoomPolicy;
use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Compute free intervals for every eligible room on `date`.
///
/// Records are processed by ascending end time. Per room, `next_available`
/// starts at opening time:
/// - a record starting before `next_available` collides and only pushes
///   `next_available` forward;
/// - otherwise the gap `[next_available, start]` is free (zero-length kept).
///
/// Each room with records then gets a trailing interval up to its closing
/// time. Every emitted interval is clamped to closing, so time after closing
/// shows up as zero-length `[closing, closing]` slots.
/// Eligible rooms without records get the whole operating window.
pub fn compute_availability(
    date: NaiveDate,
    occupancy: &[OccupancyRecord],
    policy: &RoomPolicy,
    include_restricted: bool,
) -> Availability {
    let opening = policy.opening(date);

    let mut relevant: Vec<&OccupancyRecord> = occupancy
        .iter()
        .filter(|r| policy.catalog.is_eligible(&r.room, include_restricted))
        .collect();
    // Stable: equal end times keep upstream order.
    relevant.sort_by_key(|r| r.end);

    let mut sweeps: HashMap<&str, RoomSweep> = HashMap::new();

    for record in relevant {
        let room = record.room.as_str();
        let sweep = sweeps.entry(room).or_insert_with(|| RoomSweep {
            next_available: opening,
            closing: policy.closing(date, policy.catalog.category_of(room)),
            slots: Vec::new(),
        });

        if sweep.next_available > record.start {
            sweep.next_available = sweep.next_available.max(record.end);
            continue;
        }

        sweep.push_free(record.start);
        sweep.next_available = record.end;
    }

    let rooms = policy
        .catalog
        .eligible_rooms(include_restricted)
        .map(|(room, category)| {
            let intervals = match sweeps.remove(room) {
                Some(mut sweep) => {
                    sweep.push_free(sweep.closing);
                    sweep.slots
                }
                None => vec![Interval::new(opening, policy.closing(date, category))],
            };
            RoomAvailability {
                room: room.to_string(),
                category,
                intervals,
            }
        })
        .collect();

    Availability::new(rooms)
}

struct RoomSweep {
    next_available: Instant,
    closing: Instant,
    slots: Vec<Interval>,
}

impl RoomSweep {
    /// Free time from `next_available` until `until`, both ends capped at closing.
    fn push_free(&mut self, until: Instant) {
        let from = self.next_available.min(self.closing);
        let to = until.min(self.closing);
        self.slots.push(Interval::new(from, to));
    }
}
