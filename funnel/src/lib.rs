//! A lock-free, intrusive, multi-producer single-consumer FIFO queue.
//!
//! Producers append with one atomic swap on the tail and one store into the
//! previous node. The consumer detaches from the head, and waits briefly
//! whenever a producer has swapped the tail but not yet linked its node.
//!
//! ```
//! use funnel::ValueQueue;
//!
//! let q = ValueQueue::<u32>::new();
//! std::thread::scope(|cx| {
//!     for i in 0..4 {
//!         let q = &q;
//!         cx.spawn(move || q.push_value(i));
//!     }
//! });
//!
//! let mut values = q.consume().map(|e| e.into_inner()).collect::<Vec<_>>();
//! values.sort();
//! assert_eq!(values, [0, 1, 2, 3]);
//! ```

mod entry;
pub use entry::{Entry, ValueQueue};

mod node;
pub use node::{Linked, Links};

mod queue;
pub use queue::{Consumer, Queue};
