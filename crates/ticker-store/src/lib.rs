pub mod error;
pub mod extract;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use extract::extract_tickers;
pub use store::{TickerRecord, TickerRepository, TickerStore, DEFAULT_RETENTION_DAYS};
