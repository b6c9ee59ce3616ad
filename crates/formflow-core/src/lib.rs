pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::FormflowConfig;
pub use error::{FormflowError, Result};
pub use events::{EventBus, ProcessingEvent};
pub use types::*;
