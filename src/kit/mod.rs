pub mod errors;
pub mod sync;
pub mod types;

pub use errors::*;
pub use sync::{StatusInfo, SyncOrchestrator};
pub use types::*;
