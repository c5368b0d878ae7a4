use std::sync::Arc;

use log::warn;
use tokio::time::{interval, MissedTickBehavior};

use crate::node::ChordNode;

/// Periodic successor/predecessor reconciliation. Pass failures are logged
/// and the loop keeps going; it only ends with the process.
pub async fn run(node: Arc<ChordNode>) {
    let mut ticker = interval(node.config().stabilize_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = node.stabilize().await {
            warn!("Stabilize pass failed: {e}");
        }
    }
}
