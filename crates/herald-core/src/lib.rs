pub mod backoff;
pub mod campaign;
pub mod config;
pub mod error;
pub mod event;
pub mod prompts;
pub mod traits;
pub mod types;

pub use campaign::{AssetTask, Campaign, RetryLedger};
pub use config::AppConfig;
pub use error::{HeraldError, Result};
pub use event::EventBus;
pub use types::*;
