//! Unread aggregation.
//!
//! The total is always recomputed from the store snapshot and never cached,
//! so it cannot drift from the per-conversation counts.

use crate::store::StoreSnapshot;

pub fn total_unread(snapshot: &StoreSnapshot) -> u64 {
    snapshot
        .conversations()
        .map(|c| u64::from(c.unread_count))
        .sum()
}
