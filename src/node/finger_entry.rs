use std::fmt;
use std::fmt::Debug;

use crate::utils::types::{Address, HashPos};

/// An entry in the routing cache: the ring position the entry covers and
/// the peer currently believed to be the successor of that position.
#[derive(Clone, PartialEq, Eq)]
pub struct FingerEntry {
    pub(crate) start: HashPos,
    pub(crate) address: Address,
}

impl Debug for FingerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("start", &self.start)
            .field("address", &self.address)
            .finish()
    }
}

impl FingerEntry {
    pub fn new(start: HashPos, address: &Address) -> Self {
        FingerEntry {
            start,
            address: address.clone(),
        }
    }

    pub fn start(&self) -> HashPos {
        self.start
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}
