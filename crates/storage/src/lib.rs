pub mod adapter;
pub mod error;
pub mod fake;
pub mod s3;

pub use adapter::{NullPartRecorder, PartRecorder, StorageAdapter};
pub use error::StorageError;
pub use fake::FakeStorageAdapter;
pub use s3::S3StorageAdapter;
