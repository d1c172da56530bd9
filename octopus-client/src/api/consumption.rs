use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::domain::{Reading, ReadingType};

/// Largest `page_size` the consumption endpoints accept: a year of half-hour
/// slots.
pub const MAX_PAGE_SIZE: u32 = 25_000;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("octopus api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("octopus api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("page_size {0} outside 1..=25000")]
    PageSize(u32),
    #[error("invalid period_from: {0}")]
    Timestamp(String),
    #[error("invalid octopus api url '{0}'")]
    BaseUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOrder {
    Ascending,
    Descending,
}

impl PeriodOrder {
    fn as_query(self) -> &'static str {
        match self {
            PeriodOrder::Ascending => "period",
            PeriodOrder::Descending => "-period",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionQuery {
    pub period_from: OffsetDateTime,
    pub order: PeriodOrder,
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
struct ConsumptionPage {
    count: u64,
    results: Vec<Reading>,
}

/// Thin client for the Octopus Energy consumption endpoints.
///
/// The API key travels as the basic-auth username with an empty password.
pub struct OctopusClient {
    base_url: Url,
    api_key: String,
    client: reqwest::Client,
}

impl OctopusClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let base_url: String = base_url.into();
        let parsed = Url::parse(&base_url).map_err(|_| ClientError::BaseUrl(base_url.clone()))?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::BaseUrl(base_url));
        }

        Ok(Self {
            base_url: parsed,
            api_key: api_key.into(),
            client: builder.build()?,
        })
    }

    /// Identifiers are appended as percent-encoded path segments.
    fn consumption_url(
        &self,
        reading_type: ReadingType,
        meter_point: &str,
        serial: &str,
    ) -> Result<Url, ClientError> {
        let kind = match reading_type {
            ReadingType::Electricity => "electricity-meter-points",
            ReadingType::Gas => "gas-meter-points",
        };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v1", kind, meter_point, "meters", serial, "consumption", ""]);
        Ok(url)
    }

    /// Fetch one page of half-hourly consumption for a meter.
    ///
    /// `meter_point` is the MPAN for electricity and the MPRN for gas.
    pub async fn consumption(
        &self,
        reading_type: ReadingType,
        meter_point: &str,
        serial: &str,
        query: &ConsumptionQuery,
    ) -> Result<Vec<Reading>, ClientError> {
        if query.page_size == 0 || query.page_size > MAX_PAGE_SIZE {
            return Err(ClientError::PageSize(query.page_size));
        }

        let period_from = query
            .period_from
            .format(&Rfc3339)
            .map_err(|e| ClientError::Timestamp(e.to_string()))?;
        let page_size = query.page_size.to_string();
        let url = self.consumption_url(reading_type, meter_point, serial)?;

        let resp = self
            .client
            .get(url)
            .basic_auth(&self.api_key, None::<&str>)
            .query(&[
                ("period_from", period_from.as_str()),
                ("order_by", query.order.as_query()),
                ("page_size", page_size.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let page: ConsumptionPage = resp.json().await?;
        tracing::debug!(
            %reading_type,
            period_from = %period_from,
            returned = page.results.len(),
            total = page.count,
            "fetched consumption page"
        );

        Ok(page.results)
    }
}
