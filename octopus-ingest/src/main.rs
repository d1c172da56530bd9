use anyhow::{bail, Result};
use clap::Parser;
use octopus_client::OctopusClient;
use octopus_ingest::{
    config::{AppConfig, Args},
    labels::LabelBuilder,
    observability,
    pipeline::Backfill,
    sinks::RemoteWriteClient,
    sources::OctopusSource,
};
use time::OffsetDateTime;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    observability::init_tracing();

    // Load configuration (OCTOPUS_INGEST_CONFIG points at the TOML file).
    let mut cfg = AppConfig::load()?;
    cfg.backfill.apply_args(&args);
    let targets = cfg.targets()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        observability::init_metrics(&metrics_cfg.bind_addr)?;
    }

    let client = OctopusClient::new(
        &cfg.octopus.api_url,
        &cfg.octopus.api_key,
        cfg.octopus_timeout(),
    )?;

    let mut sink = RemoteWriteClient::new(&cfg.remote_write.url, cfg.remote_write_timeout())?;
    let remote = &cfg.remote_write;
    if let (Some(username), Some(password)) = (&remote.username, &remote.password) {
        sink = sink.with_basic_auth(username, password);
    }

    let backfill = Backfill {
        source: OctopusSource::new(client),
        sink,
        labels: LabelBuilder::new(cfg.labels.clone()),
        options: cfg.backfill_options(),
        start: cfg.start_mode(),
    };

    let runs = backfill.run_all(&targets, OffsetDateTime::now_utc()).await;
    for run in &runs {
        if let Some(e) = run.error() {
            bail!(
                "{} backfill failed after pushing {} readings (cursor {}): {e}",
                run.reading_type,
                run.readings_pushed,
                run.cursor
            );
        }

        tracing::info!(
            reading_type = %run.reading_type,
            pushed = run.readings_pushed,
            skipped = run.readings_skipped,
            "pushed consumption to remote write"
        );
    }

    Ok(())
}
