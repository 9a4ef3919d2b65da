pub mod config;
pub mod error;
pub mod feed;
pub mod publish;
pub mod scan;
pub mod storage;

pub use config::AppConfig;
pub use error::{Error, Result};
