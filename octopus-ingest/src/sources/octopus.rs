use async_trait::async_trait;
use octopus_client::{ConsumptionQuery, OctopusClient, Reading, ReadingType};

use crate::pipeline::{MeterIds, PageRequest, PipelineError, ReadingSource};

/// Reading source backed by the Octopus Energy consumption API.
pub struct OctopusSource {
    client: OctopusClient,
}

impl OctopusSource {
    pub fn new(client: OctopusClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadingSource for OctopusSource {
    async fn fetch(
        &self,
        reading_type: ReadingType,
        meter: &MeterIds,
        request: &PageRequest,
    ) -> Result<Vec<Reading>, PipelineError> {
        let query = ConsumptionQuery {
            period_from: request.from,
            order: request.order,
            page_size: request.page_size,
        };

        self.client
            .consumption(reading_type, &meter.meter_point, &meter.serial, &query)
            .await
            .map_err(|e| {
                metrics::counter!("octopus_fetch_errors_total").increment(1);
                let point = &meter.meter_point;
                PipelineError::Fetch(format!("{reading_type} consumption for {point}: {e}"))
            })
    }
}
