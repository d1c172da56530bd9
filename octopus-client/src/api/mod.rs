pub mod consumption;

pub use consumption::{ClientError, ConsumptionQuery, OctopusClient, PeriodOrder, MAX_PAGE_SIZE};
