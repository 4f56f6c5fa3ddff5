pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::PlatformConfig;
pub use error::{PlatformError, Result};
pub use events::{ActionEvent, ActionEventKind};
pub use types::*;
