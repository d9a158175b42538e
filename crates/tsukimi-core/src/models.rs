mod media;
mod progress;
mod source;
mod sync;

pub use media::{AiringStatus, EpisodeMapping, EpisodeMeta, MappingState, MediaInfo};
pub use progress::{ProgressChange, ProgressEntry, TitleKind, TitleRef};
pub use source::{Language, SourceCapabilities};
pub use sync::{Identity, PendingSyncBatch, SyncOp};
