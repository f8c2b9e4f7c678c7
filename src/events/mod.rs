pub mod streams;
pub use streams::{EventStream, Subscriber};

/// Broadcast channel capacity for session events
pub const EVENT_BUS_CAPACITY: usize = 64;
/// Number of recent session events kept for late subscribers
pub const EVENT_BUFFER_SIZE: usize = 16;
