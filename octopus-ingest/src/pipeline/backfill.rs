use octopus_client::{PeriodOrder, Reading, ReadingType};
use time::OffsetDateTime;

use crate::{
    labels::{LabelBuilder, SeriesLabels},
    sinks::encode_sample,
};

use super::{Cursor, MeterIds, PageRequest, PipelineError, ReadingSource, SampleSink, StartMode};

/// HTTP status remote-write receivers use for out-of-bounds and out-of-order samples.
const STALE_SAMPLE_STATUS: u16 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    pub page_size: u32,
    /// Skip samples the backend rejects with 400 instead of failing the page.
    pub skip_rejected_samples: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillTarget {
    pub reading_type: ReadingType,
    pub meter: MeterIds,
}

/// Per reading type: `Fetching -> Delivering -> Advancing -> Fetching ...`
/// until an empty page (`Done`) or the first error (`Failed`).
#[derive(Debug)]
pub enum BackfillState {
    Fetching,
    Delivering(Vec<Reading>),
    /// Carries the last reading of the page that was just delivered.
    Advancing(Reading),
    Done,
    Failed(PipelineError),
}

impl BackfillState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackfillState::Done | BackfillState::Failed(_))
    }
}

/// Outcome of draining one reading type.
#[derive(Debug)]
pub struct BackfillRun {
    pub reading_type: ReadingType,
    /// Either `Done` or `Failed`.
    pub state: BackfillState,
    pub cursor: OffsetDateTime,
    pub pages_delivered: usize,
    pub readings_pushed: usize,
    pub readings_skipped: usize,
}

impl BackfillRun {
    pub fn is_done(&self) -> bool {
        matches!(self.state, BackfillState::Done)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match &self.state {
            BackfillState::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Backfill of a single reading type with its own cursor and label set.
pub struct ReadingBackfill<'a, S, K> {
    reading_type: ReadingType,
    meter: &'a MeterIds,
    labels: SeriesLabels,
    cursor: Cursor,
    options: BackfillOptions,
    source: &'a S,
    sink: &'a K,
    pages_delivered: usize,
    readings_pushed: usize,
    readings_skipped: usize,
}

impl<'a, S, K> ReadingBackfill<'a, S, K>
where
    S: ReadingSource,
    K: SampleSink,
{
    pub fn new(
        target: &'a BackfillTarget,
        labels: SeriesLabels,
        cursor: Cursor,
        options: BackfillOptions,
        source: &'a S,
        sink: &'a K,
    ) -> Self {
        Self {
            reading_type: target.reading_type,
            meter: &target.meter,
            labels,
            cursor,
            options,
            source,
            sink,
            pages_delivered: 0,
            readings_pushed: 0,
            readings_skipped: 0,
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn readings_pushed(&self) -> usize {
        self.readings_pushed
    }

    /// Perform the work of `state` and return the state that follows it.
    /// Terminal states are returned unchanged.
    pub async fn step(&mut self, state: BackfillState) -> BackfillState {
        match state {
            BackfillState::Fetching => self.fetch_page().await,
            BackfillState::Delivering(readings) => self.deliver_page(readings).await,
            BackfillState::Advancing(last) => self.advance(&last),
            terminal => terminal,
        }
    }

    pub async fn run(mut self) -> BackfillRun {
        let mut state = BackfillState::Fetching;
        while !state.is_terminal() {
            state = self.step(state).await;
        }

        match &state {
            BackfillState::Failed(e) => tracing::error!(
                reading_type = %self.reading_type,
                error = %e,
                cursor = %self.cursor.current(),
                pushed = self.readings_pushed,
                "backfill failed"
            ),
            _ => tracing::info!(
                reading_type = %self.reading_type,
                cursor = %self.cursor.current(),
                pages = self.pages_delivered,
                pushed = self.readings_pushed,
                skipped = self.readings_skipped,
                "backfill complete"
            ),
        }

        BackfillRun {
            reading_type: self.reading_type,
            state,
            cursor: self.cursor.current(),
            pages_delivered: self.pages_delivered,
            readings_pushed: self.readings_pushed,
            readings_skipped: self.readings_skipped,
        }
    }

    async fn fetch_page(&mut self) -> BackfillState {
        let request = PageRequest {
            from: self.cursor.current(),
            order: PeriodOrder::Ascending,
            page_size: self.options.page_size,
        };

        match self.source.fetch(self.reading_type, self.meter, &request).await {
            Ok(readings) if readings.is_empty() => {
                tracing::debug!(
                    reading_type = %self.reading_type,
                    from = %request.from,
                    "empty page"
                );
                BackfillState::Done
            }
            Ok(readings) => {
                metrics::counter!("octopus_pages_fetched_total").increment(1);
                tracing::info!(
                    reading_type = %self.reading_type,
                    from = %request.from,
                    readings = readings.len(),
                    "fetched page"
                );
                BackfillState::Delivering(readings)
            }
            Err(e) => BackfillState::Failed(e),
        }
    }

    async fn deliver_page(&mut self, mut readings: Vec<Reading>) -> BackfillState {
        for reading in &readings {
            let payload = match encode_sample(&self.labels, reading) {
                Ok(payload) => payload,
                Err(e) => {
                    metrics::counter!("encode_errors_total").increment(1);
                    return BackfillState::Failed(e);
                }
            };

            match self.sink.deliver(payload).await {
                Ok(()) => {
                    self.readings_pushed += 1;
                    tracing::debug!(
                        reading_type = %self.reading_type,
                        interval_start = %reading.interval_start,
                        kwh = reading.consumption,
                        "pushed sample"
                    );
                }
                Err(PipelineError::Rejected { status, body })
                    if self.options.skip_rejected_samples && status == STALE_SAMPLE_STATUS =>
                {
                    self.readings_skipped += 1;
                    metrics::counter!("remote_write_samples_skipped_total").increment(1);
                    tracing::warn!(
                        reading_type = %self.reading_type,
                        interval_start = %reading.interval_start,
                        body = %body,
                        "sample rejected by backend, skipping"
                    );
                }
                Err(e) => return BackfillState::Failed(e),
            }
        }

        match readings.pop() {
            Some(last) => BackfillState::Advancing(last),
            None => BackfillState::Done,
        }
    }

    fn advance(&mut self, last: &Reading) -> BackfillState {
        let before = self.cursor.current();
        if !self.cursor.advance(last) {
            return BackfillState::Failed(PipelineError::Fetch(format!(
                "page ending {} does not move the cursor past {before}",
                last.interval_end
            )));
        }

        self.pages_delivered += 1;
        BackfillState::Fetching
    }
}

/// Drains each configured reading type in turn.
pub struct Backfill<S, K> {
    pub source: S,
    pub sink: K,
    pub labels: LabelBuilder,
    pub options: BackfillOptions,
    pub start: StartMode,
}

impl<S, K> Backfill<S, K>
where
    S: ReadingSource,
    K: SampleSink,
{
    pub fn reading_backfill<'a>(
        &'a self,
        target: &'a BackfillTarget,
        now: OffsetDateTime,
    ) -> ReadingBackfill<'a, S, K> {
        ReadingBackfill::new(
            target,
            self.labels.build(target.reading_type, &target.meter),
            Cursor::initial(now, self.start),
            self.options,
            &self.source,
            &self.sink,
        )
    }

    /// Run targets sequentially, stopping after the first one that fails.
    pub async fn run_all(
        &self,
        targets: &[BackfillTarget],
        now: OffsetDateTime,
    ) -> Vec<BackfillRun> {
        let mut runs = Vec::with_capacity(targets.len());
        for target in targets {
            let run = self.reading_backfill(target, now).run().await;
            let failed = !run.is_done();
            runs.push(run);
            if failed {
                break;
            }
        }
        runs
    }
}
