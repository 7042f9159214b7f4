pub mod config;
pub mod error;
pub mod modules;
pub mod pipeline;
pub mod utils;

pub use config::{Credentials, Settings};
pub use error::{AssessError, Result};
pub use pipeline::Pipeline;
