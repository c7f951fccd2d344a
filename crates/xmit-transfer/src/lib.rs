pub mod codec;
pub mod discover;
pub mod engine;
pub mod progress;
pub mod resolve;
pub mod semaphore;

pub use discover::discover;
pub use engine::{ChunkUploadResult, Downloader, Uploader};
pub use resolve::ClientPool;
