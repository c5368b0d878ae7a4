pub mod chord;
pub mod finger_entry;
pub mod finger_table;

pub use chord::{ChordNode, NodeSummary};
