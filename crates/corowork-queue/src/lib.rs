//! Lock-free and striped concurrent data structures backing the corowork
//! thread pool: an unbounded MPMC queue, a bounded SPMC ring, and a sharded
//! map used to enumerate per-worker local queues for work stealing.

mod mpmc;
mod ring;
mod sharded_map;

pub use mpmc::UnboundedMpmcQueue;
pub use ring::SpmcRing;
pub use sharded_map::ShardedMap;
