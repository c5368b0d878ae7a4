use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};

use crate::node::ChordNode;

/// Periodic finger repair, one entry per tick round-robin. Failed lookups
/// are absorbed by the pass itself (the entry degrades to self).
pub async fn run(node: Arc<ChordNode>) {
    let mut ticker = interval(node.config().fix_fingers_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        node.fix_fingers().await;
    }
}
