pub mod http_client;
pub mod inflight;

pub use http_client::{HttpClient, ReqwestHttpClient, UpstreamRequest, UpstreamResponse};
pub use inflight::{InFlightGuard, InFlightSet};
