pub mod prompb;
pub mod remote_write;

pub use remote_write::{encode_sample, RemoteWriteClient};
