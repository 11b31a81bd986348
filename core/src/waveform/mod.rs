pub mod collection;
pub mod store;
pub mod trace;

pub use collection::TraceCollection;
pub use store::{ArchiveError, JsonArchive, WaveformStore};
pub use trace::WaveformTrace;
