pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod receipt;
pub mod store;

pub use config::IndexConfig;
pub use error::{Error, Result};
pub use index::LogIndex;
pub use receipt::{Address, Log, Receipt, Topic};
