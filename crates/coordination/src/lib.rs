pub mod adapter;
pub mod error;
pub mod fake;
pub mod http;

pub use adapter::{CoordinationAdapter, DocumentSnapshot, Subscription};
pub use error::CoordinationError;
pub use fake::FakeCoordinationAdapter;
pub use http::HttpCoordinationAdapter;
