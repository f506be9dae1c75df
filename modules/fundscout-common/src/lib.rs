pub mod config;
pub mod error;
pub mod ttl;
pub mod types;

pub use config::Config;
pub use error::FundScoutError;
pub use ttl::TtlKv;
pub use types::*;
