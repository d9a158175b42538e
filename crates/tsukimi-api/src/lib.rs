pub mod mapping;
pub mod sync;
pub mod traits;
