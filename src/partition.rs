//! Splits a trip's date range into calendar-day slots.
//!
//! Each slot is 23h59m wide and slots start 24h apart. A slot is only
//! emitted while its end still fits inside the trip, so a trip shorter than
//! 23h59m yields no days and the minute after the last full slot is dropped.

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{error::AppError, models::trip::Trip, store::TripStore};

/// Width of one day slot.
pub fn day_span() -> Duration {
    Duration::hours(23) + Duration::minutes(59)
}

/// Distance between consecutive slot starts.
pub fn day_step() -> Duration {
    Duration::days(1)
}

/// Longest trip, in days, that is partitioned.
pub const MAX_TRIP_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("trip starts ({start}) after it ends ({end})")]
    StartAfterEnd {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("trips can last at most {max_days} days")]
    TooLong { max_days: i64 },
    #[error("trip dates are out of the supported range")]
    OutOfRange,
}

/// One generated day, before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub day_num: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

pub fn partition(
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<DayWindow>, PartitionError> {
    if start > end {
        return Err(PartitionError::StartAfterEnd { start, end });
    }
    if end.signed_duration_since(start) >= Duration::days(MAX_TRIP_DAYS) {
        return Err(PartitionError::TooLong {
            max_days: MAX_TRIP_DAYS,
        });
    }

    let mut windows = Vec::new();
    let mut day_num = 1;
    let mut day_start = start;
    let mut day_end = day_start
        .checked_add_signed(day_span())
        .ok_or(PartitionError::OutOfRange)?;

    while day_end <= end {
        windows.push(DayWindow {
            day_num,
            start: day_start,
            end: day_end,
        });

        // nothing past the representable range can fit inside the trip
        let Some(next_end) = day_end.checked_add_signed(day_step()) else {
            break;
        };
        day_num += 1;
        day_start += day_step();
        day_end = next_end;
    }

    Ok(windows)
}

/// Generates the days of an existing trip and writes them as one batch.
///
/// Returns how many days were written. Nothing guards against running this
/// twice for the same trip; a second run writes a second full set.
pub async fn partition_trip<S>(store: &S, trip: &Trip) -> Result<usize, AppError>
where
    S: TripStore + ?Sized,
{
    let windows = partition(trip.start, trip.end)?;
    if windows.is_empty() {
        warn!(trip_id = trip.id, "trip is shorter than one day; no days generated");
        return Ok(0);
    }

    store.insert_days(trip.id, &windows).await?;
    debug!(trip_id = trip.id, days = windows.len(), "days generated");
    Ok(windows.len())
}
