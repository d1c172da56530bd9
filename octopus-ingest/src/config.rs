use std::{collections::BTreeMap, fs, time::Duration};

use clap::Parser;
use octopus_client::{ReadingType, MAX_PAGE_SIZE};
use serde::Deserialize;

use crate::pipeline::{BackfillOptions, BackfillTarget, MeterIds, PipelineError, StartMode};

/// Longest accepted lookback window: 100 years of hours.
pub const MAX_LOOKBACK_HOURS: u64 = 24 * 366 * 100;

/// Backfill consumption readings from the Octopus Energy API into a
/// Prometheus remote-write endpoint.
#[derive(Debug, Default, Parser)]
#[command(name = "octopus-ingest", version, about)]
pub struct Args {
    /// Ingest electricity readings. Replaces `backfill.ingest` when given.
    #[arg(long)]
    pub electricity: bool,
    /// Ingest gas readings. Replaces `backfill.ingest` when given.
    #[arg(long)]
    pub gas: bool,
    /// Start from the historical epoch instead of the lookback window.
    #[arg(long)]
    pub full_backfill: bool,
}

fn default_api_url() -> String {
    "https://api.octopus.energy".to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_lookback_hours() -> u64 {
    48
}

#[derive(Debug, Clone, Deserialize)]
pub struct OctopusConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub api_key: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElectricityMeterConfig {
    pub mpan: String,
    pub serial: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GasMeterConfig {
    pub mprn: String,
    pub serial: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteWriteConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub skip_rejected_samples: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    #[serde(default)]
    pub ingest: Vec<ReadingType>,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    /// Start from the fixed historical epoch; `lookback_hours` is ignored.
    #[serde(default)]
    pub full: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            ingest: Vec::new(),
            lookback_hours: default_lookback_hours(),
            full: false,
        }
    }
}

impl BackfillConfig {
    /// Apply command line flags. Any reading type flag replaces the
    /// configured `ingest` list.
    pub fn apply_args(&mut self, args: &Args) {
        let mut ingest = Vec::new();
        if args.electricity {
            ingest.push(ReadingType::Electricity);
        }
        if args.gas {
            ingest.push(ReadingType::Gas);
        }
        if !ingest.is_empty() {
            self.ingest = ingest;
        }
        if args.full_backfill {
            self.full = true;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub octopus: OctopusConfig,
    pub electricity: Option<ElectricityMeterConfig>,
    pub gas: Option<GasMeterConfig>,
    pub remote_write: RemoteWriteConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    /// Static labels added to every series.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("OCTOPUS_INGEST_CONFIG")
            .unwrap_or_else(|_| "octopus-ingest.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.octopus.api_key.trim().is_empty() {
            return Err(PipelineError::Config("octopus.api_key is empty".to_string()));
        }
        if self.octopus.page_size == 0 || self.octopus.page_size > MAX_PAGE_SIZE {
            return Err(PipelineError::Config(format!(
                "octopus.page_size must be within 1..={MAX_PAGE_SIZE}, got {}",
                self.octopus.page_size
            )));
        }
        if self.remote_write.url.trim().is_empty() {
            return Err(PipelineError::Config("remote_write.url is empty".to_string()));
        }
        if self.remote_write.username.is_some() != self.remote_write.password.is_some() {
            return Err(PipelineError::Config(
                "remote_write.username and remote_write.password must be set together".to_string(),
            ));
        }
        if self.backfill.ingest.is_empty() {
            return Err(PipelineError::Config(
                "no consumption type selected (backfill.ingest or --gas/--electricity)".to_string(),
            ));
        }
        if !self.backfill.full && self.backfill.lookback_hours > MAX_LOOKBACK_HOURS {
            return Err(PipelineError::Config(format!(
                "backfill.lookback_hours must be at most {MAX_LOOKBACK_HOURS}, got {}",
                self.backfill.lookback_hours
            )));
        }

        let missing: Vec<String> = self
            .backfill
            .ingest
            .iter()
            .filter_map(|t| match self.meter_ids(*t) {
                Err(PipelineError::Config(msg)) => Some(msg),
                _ => None,
            })
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Config(missing.join("; ")));
        }

        Ok(())
    }

    /// Meter identifiers for `reading_type`; both must be present and non-empty.
    pub fn meter_ids(&self, reading_type: ReadingType) -> Result<MeterIds, PipelineError> {
        let (section, point_name, ids) = match reading_type {
            ReadingType::Electricity => (
                "electricity",
                "mpan",
                self.electricity.as_ref().map(|m| (&m.mpan, &m.serial)),
            ),
            ReadingType::Gas => ("gas", "mprn", self.gas.as_ref().map(|m| (&m.mprn, &m.serial))),
        };

        let (meter_point, serial) =
            ids.ok_or_else(|| PipelineError::Config(format!("missing [{section}] section")))?;
        if meter_point.trim().is_empty() {
            return Err(PipelineError::Config(format!("{section}.{point_name} is empty")));
        }
        if serial.trim().is_empty() {
            return Err(PipelineError::Config(format!("{section}.serial is empty")));
        }

        Ok(MeterIds {
            meter_point: meter_point.trim().to_string(),
            serial: serial.trim().to_string(),
        })
    }

    /// Validated reading types to backfill, in configured order, without repeats.
    pub fn targets(&self) -> Result<Vec<BackfillTarget>, PipelineError> {
        self.validate()?;

        let mut targets: Vec<BackfillTarget> = Vec::with_capacity(self.backfill.ingest.len());
        for reading_type in &self.backfill.ingest {
            if targets.iter().any(|t| t.reading_type == *reading_type) {
                continue;
            }
            targets.push(BackfillTarget {
                reading_type: *reading_type,
                meter: self.meter_ids(*reading_type)?,
            });
        }
        Ok(targets)
    }

    pub fn start_mode(&self) -> StartMode {
        if self.backfill.full {
            StartMode::Full
        } else {
            let hours = self.backfill.lookback_hours.min(MAX_LOOKBACK_HOURS);
            let hours = i64::try_from(hours).unwrap_or(i64::MAX / 3600);
            StartMode::Lookback(time::Duration::hours(hours))
        }
    }

    pub fn backfill_options(&self) -> BackfillOptions {
        BackfillOptions {
            page_size: self.octopus.page_size,
            skip_rejected_samples: self.remote_write.skip_rejected_samples,
        }
    }

    pub fn octopus_timeout(&self) -> Option<Duration> {
        self.octopus.timeout_secs.map(Duration::from_secs)
    }

    pub fn remote_write_timeout(&self) -> Option<Duration> {
        self.remote_write.timeout_secs.map(Duration::from_secs)
    }
}
