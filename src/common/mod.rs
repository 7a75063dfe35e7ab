pub mod constants;
pub mod error;
pub mod json;
pub mod retry;
pub mod types;
