use std::time::{Duration, Instant};

use async_trait::async_trait;
use octopus_client::Reading;
use prost::Message;
use reqwest::{header, StatusCode};
use time::OffsetDateTime;

use crate::{
    labels::SeriesLabels,
    pipeline::{PipelineError, SampleSink},
    sinks::prompb::{Label, Sample, TimeSeries, WriteRequest},
    transform::validate_reading,
};

pub const CONTENT_TYPE: &str = "application/x-protobuf";
pub const CONTENT_ENCODING: &str = "snappy";
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";
pub const REMOTE_WRITE_VERSION_HEADER: &str = "X-Prometheus-Remote-Write-Version";
const USER_AGENT: &str = concat!("octopus-ingest/", env!("CARGO_PKG_VERSION"));

fn unix_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Single-sample write request for one reading: stamped at `interval_start`.
pub fn write_request(
    labels: &SeriesLabels,
    reading: &Reading,
) -> Result<WriteRequest, PipelineError> {
    validate_reading(reading)?;

    Ok(WriteRequest {
        timeseries: vec![TimeSeries {
            labels: labels
                .iter()
                .map(|l| Label {
                    name: l.name.clone(),
                    value: l.value.clone(),
                })
                .collect(),
            samples: vec![Sample {
                value: reading.consumption,
                timestamp: unix_millis(reading.interval_start),
            }],
        }],
    })
}

/// Serialise and snappy-compress (raw block format) one reading.
pub fn encode_sample(labels: &SeriesLabels, reading: &Reading) -> Result<Vec<u8>, PipelineError> {
    let request = write_request(labels, reading)?;
    snap::raw::Encoder::new()
        .compress_vec(&request.encode_to_vec())
        .map_err(|e| PipelineError::Encode(format!("snappy compression failed: {e}")))
}

/// POSTs encoded payloads to a remote-write endpoint.
///
/// Only `204 No Content` counts as success. Nothing is retried here.
pub struct RemoteWriteClient {
    url: String,
    auth: Option<(String, String)>,
    client: reqwest::Client,
}

impl RemoteWriteClient {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, PipelineError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            PipelineError::Config(format!("failed to build remote write client: {e}"))
        })?;

        Ok(Self {
            url: url.into(),
            auth: None,
            client,
        })
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }
}

#[async_trait]
impl SampleSink for RemoteWriteClient {
    async fn deliver(&self, payload: Vec<u8>) -> Result<(), PipelineError> {
        let bytes = payload.len();
        let mut request = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .header(header::CONTENT_ENCODING, CONTENT_ENCODING)
            .header(REMOTE_WRITE_VERSION_HEADER, REMOTE_WRITE_VERSION)
            .body(payload);
        if let Some((username, password)) = &self.auth {
            request = request.basic_auth(username, Some(password));
        }

        let started = Instant::now();
        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                metrics::counter!("remote_write_errors_total").increment(1);
                return Err(PipelineError::Transport(e.to_string()));
            }
        };
        metrics::histogram!("remote_write_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let status = resp.status();
        if status != StatusCode::NO_CONTENT {
            metrics::counter!("remote_write_errors_total").increment(1);
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        metrics::counter!("remote_write_samples_total").increment(1);
        metrics::counter!("remote_write_bytes_total").increment(bytes as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{labels::LabelBuilder, pipeline::MeterIds};
    use mockito::Matcher;
    use octopus_client::ReadingType;
    use time::{macros::datetime, Duration as TimeDuration};

    fn labels() -> SeriesLabels {
        LabelBuilder::default().build(
            ReadingType::Electricity,
            &MeterIds {
                meter_point: "1200000000000".to_string(),
                serial: "21L000".to_string(),
            },
        )
    }

    fn page(n: usize) -> Vec<Reading> {
        let start = datetime!(2024-01-01 00:00:00 UTC);
        (0..n)
            .map(|i| {
                let interval_start = start + TimeDuration::minutes(30 * i as i64);
                Reading {
                    interval_start,
                    interval_end: interval_start + TimeDuration::minutes(30),
                    consumption: 0.25 * (i + 1) as f64,
                }
            })
            .collect()
    }

    fn write_url(server: &mockito::ServerGuard) -> String {
        format!("{}/api/v1/write", server.url())
    }

    fn decode(payload: &[u8]) -> WriteRequest {
        let raw = snap::raw::Decoder::new().decompress_vec(payload).unwrap();
        WriteRequest::decode(raw.as_slice()).unwrap()
    }

    #[test]
    fn each_reading_encodes_to_its_own_request() {
        let readings = page(3);
        let labels = labels();
        let payloads: Vec<Vec<u8>> = readings
            .iter()
            .map(|r| encode_sample(&labels, r).unwrap())
            .collect();

        let first_labels = decode(&payloads[0]).timeseries[0].labels.clone();
        for (payload, reading) in payloads.iter().zip(&readings) {
            let request = decode(payload);
            assert_eq!(request.timeseries.len(), 1);

            let series = &request.timeseries[0];
            assert_eq!(series.labels, first_labels);
            assert_eq!(series.samples.len(), 1);
            assert_eq!(series.samples[0].value, reading.consumption);
            assert_eq!(series.samples[0].timestamp, unix_millis(reading.interval_start));
        }
    }

    #[test]
    fn sample_is_stamped_with_interval_start_in_millis() {
        let request = write_request(&labels(), &page(1)[0]).unwrap();
        let series = &request.timeseries[0];

        assert_eq!(series.samples[0].timestamp, 1_704_067_200_000);
        assert_eq!(series.labels[0].name, "__name__");
        assert_eq!(series.labels[0].value, "octopus_consumption_electricity_kwh");
    }

    #[test]
    fn malformed_reading_fails_to_encode() {
        let mut reading = page(1).remove(0);
        reading.consumption = f64::NAN;

        let result = encode_sample(&labels(), &reading);
        assert!(matches!(result, Err(PipelineError::Encode(_))));
    }

    #[tokio::test]
    async fn deliver_sends_remote_write_headers() {
        let mut server = mockito::Server::new_async().await;
        let payload = encode_sample(&labels(), &page(1)[0]).unwrap();

        let mock = server
            .mock("POST", "/api/v1/write")
            .match_header("content-type", "application/x-protobuf")
            .match_header("content-encoding", "snappy")
            .match_header("x-prometheus-remote-write-version", "0.1.0")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .match_header("user-agent", Matcher::Regex("^octopus-ingest/".into()))
            .match_body(payload.clone())
            .with_status(204)
            .create_async()
            .await;

        let client = RemoteWriteClient::new(write_url(&server), None)
            .unwrap()
            .with_basic_auth("user", "pass");
        client.deliver(payload).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn deliver_without_credentials_sends_no_authorization() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/api/v1/write")
            .match_header("authorization", Matcher::Missing)
            .with_status(204)
            .create_async()
            .await;

        let client = RemoteWriteClient::new(write_url(&server), None).unwrap();
        client.deliver(vec![0]).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn any_status_other_than_204_is_a_rejection() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("POST", "/api/v1/write")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;
        let client = RemoteWriteClient::new(write_url(&server), None).unwrap();
        let err = client.deliver(vec![0]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Rejected { status: 200, .. }));

        server.reset_async().await;
        server
            .mock("POST", "/api/v1/write")
            .with_status(400)
            .with_body("out of bounds")
            .create_async()
            .await;
        let err = client.deliver(vec![0]).await.unwrap_err();
        match err {
            PipelineError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "out of bounds");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let client = RemoteWriteClient::new("http://127.0.0.1:9/api/v1/write", None).unwrap();
        let err = client.deliver(vec![0]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }
}
