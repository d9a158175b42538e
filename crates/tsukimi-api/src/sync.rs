pub mod client;
pub mod error;
pub mod types;

pub use client::HttpProgressClient;
pub use error::SyncError;
