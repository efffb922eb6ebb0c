//! Single-threaded collections with self-expiring members.

mod entries;
pub mod iter;
pub mod set;

pub use iter::ExpiringIter;
pub use set::{ExpiringSet, ExpiringSetBuilder, Mode};
