pub mod catalog;
pub mod config;
pub mod episodes;
pub mod error;
pub mod kv;
pub mod listeners;
pub mod models;
pub mod overlay;
pub mod resolve;
pub mod selection;
pub mod storage;
