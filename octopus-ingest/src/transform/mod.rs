use crate::pipeline::PipelineError;
use octopus_client::Reading;
use time::macros::datetime;

/// Pure validation of a `Reading` before it is serialised.
///
/// Rules:
/// - consumption must be finite and non-negative.
/// - interval_end must be after interval_start.
/// - interval_start must be within a broad sanity window [2000-01-01, 2100-01-01).
pub fn validate_reading(reading: &Reading) -> Result<(), PipelineError> {
    if !reading.consumption.is_finite() {
        return Err(PipelineError::Encode(format!(
            "consumption {} is not finite",
            reading.consumption
        )));
    }

    if reading.consumption < 0.0 {
        return Err(PipelineError::Encode("consumption must be non-negative".to_string()));
    }

    if reading.interval_end <= reading.interval_start {
        return Err(PipelineError::Encode(format!(
            "interval ending {} does not follow its start {}",
            reading.interval_end, reading.interval_start
        )));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if reading.interval_start < min_ts || reading.interval_start >= max_ts {
        return Err(PipelineError::Encode("timestamp out of allowed range".to_string()));
    }

    Ok(())
}
