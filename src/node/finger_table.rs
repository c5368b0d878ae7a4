use crate::node::finger_entry::FingerEntry;
use crate::utils::crypto::ring_size;
use crate::utils::types::{Address, HashPos};

/// The m-entry routing cache. Entry i covers the ring position
/// `(self_pos + 2^i) mod 2^m`; starts are fixed at construction, only the
/// targets ever change. The engine serializes access, the table itself
/// carries no lock and does no background work.
#[derive(Debug, Clone)]
pub struct FingerTable {
    fingers: Vec<FingerEntry>,
}

#[derive(Debug, thiserror::Error)]
#[error("expected {expected} finger targets, got {got}")]
pub struct FingerCountMismatch {
    pub expected: usize,
    pub got: usize,
}

impl FingerTable {
    /// A fresh table for a peer at `self_pos`; every target starts out as
    /// the peer itself.
    pub fn new(self_pos: HashPos, self_addr: &Address, bits: u8) -> FingerTable {
        let fingers = (0..bits)
            .map(|i| {
                let start = self_pos.wrapping_add(1u64 << i) % ring_size(bits);
                FingerEntry::new(start, self_addr)
            })
            .collect();
        FingerTable { fingers }
    }

    pub fn len(&self) -> usize {
        self.fingers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingers.is_empty()
    }

    /// Replaces target i. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, address: Address) {
        if let Some(finger) = self.fingers.get_mut(index) {
            finger.address = address;
        }
    }

    pub fn get(&self, index: usize) -> Option<Address> {
        self.fingers.get(index).map(|finger| finger.address.clone())
    }

    pub fn start(&self, index: usize) -> Option<HashPos> {
        self.fingers.get(index).map(|finger| finger.start)
    }

    pub fn set_all(&mut self, address: &Address) {
        for finger in &mut self.fingers {
            finger.address = address.clone();
        }
    }

    /// Replaces every target at once; the caller must supply exactly one
    /// address per finger.
    pub fn replace_targets(&mut self, targets: Vec<Address>) -> Result<(), FingerCountMismatch> {
        if targets.len() != self.fingers.len() {
            return Err(FingerCountMismatch {
                expected: self.fingers.len(),
                got: targets.len(),
            });
        }
        for (finger, address) in self.fingers.iter_mut().zip(targets) {
            finger.address = address;
        }
        Ok(())
    }

    pub fn entries(&self) -> &[FingerEntry] {
        &self.fingers
    }
}
