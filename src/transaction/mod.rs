/// Translation of broadcast rejections into typed backend errors
pub mod errors;
/// Builds, submits and maps transfer and custom action requests
pub mod manager;

pub use errors::translate_chain_error;
pub use manager::TransactionManager;
