//! The inventory cache and job queue (spec §4.1, §4.7): a typed
//! read-through snapshot over a key/value store, and the FIFO queue +
//! status table that turns "enqueue, wait_for_job" into real
//! out-of-process work.

mod cache;
mod fake_queue;
mod keys;
mod queue;
mod redis_backend;

pub use cache::{InventoryCache, InventorySnapshot};
pub use fake_queue::FakeJobQueue;
pub use keys::db_index;
pub use queue::{wait_for_job, JobQueue};
pub use redis_backend::{RedisInventoryCache, RedisJobQueue};
