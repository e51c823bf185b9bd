pub mod config;
pub mod coordinator;
pub mod error;
pub mod item;
pub mod segment;
pub mod semaphore;
pub mod shared_queue;
pub mod shutdown;
pub mod trace;

pub use config::{Protocol, RunConfig};
pub use coordinator::{Coordinator, Observer, Role, RunReport};
pub use error::{Result, RunError};
pub use item::{Label, QueueItem};
