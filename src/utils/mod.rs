pub mod http_client;
pub mod retry;

pub use http_client::HttpClientFactory;
pub use retry::RetryPolicy;
