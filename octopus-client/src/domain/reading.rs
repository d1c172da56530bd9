use std::fmt;

use serde::Deserialize;
use time::OffsetDateTime;

/// One half-hourly consumption interval as returned by the metering API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reading {
    #[serde(with = "time::serde::rfc3339")]
    pub interval_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub interval_end: OffsetDateTime,
    /// kWh consumed over the interval.
    pub consumption: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingType {
    Electricity,
    Gas,
}

impl ReadingType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadingType::Electricity => "electricity",
            ReadingType::Gas => "gas",
        }
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
