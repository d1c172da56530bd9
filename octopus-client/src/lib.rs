pub mod api;
pub mod domain;

pub use api::{ClientError, ConsumptionQuery, OctopusClient, PeriodOrder, MAX_PAGE_SIZE};
pub use domain::{Reading, ReadingType};
