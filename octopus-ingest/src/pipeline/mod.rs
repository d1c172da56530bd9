use async_trait::async_trait;
use octopus_client::{PeriodOrder, Reading, ReadingType};
use time::OffsetDateTime;

pub mod backfill;
pub mod cursor;

pub use backfill::{
    Backfill, BackfillOptions, BackfillRun, BackfillState, BackfillTarget, ReadingBackfill,
};
pub use cursor::{Cursor, StartMode, FULL_BACKFILL_EPOCH};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("encoding error: {0}")]
    Encode(String),
    #[error("remote write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("remote write transport error: {0}")]
    Transport(String),
    #[error("config error: {0}")]
    Config(String),
}

/// Identifiers of the physical meter behind a reading stream.
///
/// `meter_point` is the MPAN (electricity) or MPRN (gas).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterIds {
    pub meter_point: String,
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub from: OffsetDateTime,
    pub order: PeriodOrder,
    pub page_size: u32,
}

/// Produces pages of readings ordered by `interval_start`.
///
/// Implementations must return at most `page_size` readings, ascending when
/// `order` is ascending, and an empty page once the stream is exhausted.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch(
        &self,
        reading_type: ReadingType,
        meter: &MeterIds,
        request: &PageRequest,
    ) -> Result<Vec<Reading>, PipelineError>;
}

/// Accepts one encoded remote-write payload at a time.
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn deliver(&self, payload: Vec<u8>) -> Result<(), PipelineError>;
}
