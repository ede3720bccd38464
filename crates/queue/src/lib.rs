pub mod observer;

pub use observer::{observe_until_first_in_queue, QueueObserver};
