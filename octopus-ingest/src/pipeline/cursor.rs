use octopus_client::Reading;
use time::{macros::datetime, Duration, OffsetDateTime};

/// Where a full backfill starts; older than any smart meter reading.
pub const FULL_BACKFILL_EPOCH: OffsetDateTime = datetime!(2000-01-01 00:00:00 UTC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Lookback(Duration),
    Full,
}

/// Time boundary the next page fetch starts from.
///
/// Scoped to a single reading type. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    from: OffsetDateTime,
}

impl Cursor {
    pub fn starting_at(from: OffsetDateTime) -> Self {
        Self { from }
    }

    /// A lookback reaching past the representable range starts from
    /// [`FULL_BACKFILL_EPOCH`].
    pub fn initial(now: OffsetDateTime, mode: StartMode) -> Self {
        match mode {
            StartMode::Lookback(lookback) => {
                Self::starting_at(now.checked_sub(lookback).unwrap_or(FULL_BACKFILL_EPOCH))
            }
            StartMode::Full => Self::starting_at(FULL_BACKFILL_EPOCH),
        }
    }

    pub fn current(&self) -> OffsetDateTime {
        self.from
    }

    /// Move to the end of `last`. Returns false, leaving the cursor where it
    /// was, when that would not move it forward.
    pub fn advance(&mut self, last: &Reading) -> bool {
        if last.interval_end <= self.from {
            return false;
        }
        self.from = last.interval_end;
        true
    }
}
