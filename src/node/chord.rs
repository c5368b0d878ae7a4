use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use log::{debug, info, warn};

use crate::kv::Store;
use crate::node::finger_table::FingerTable;
use crate::protocol::{
    Command, FindSuccessorResponse, NotifyResponse, OpResponse, PingResponse,
    PredecessorResponse, Response, RetrieveResponse, SuccessorListResponse,
};
use crate::rpc::{self, RpcError};
use crate::utils::config::Config;
use crate::utils::crypto::{hash_id, in_half_open_arc, in_open_arc, ring_size};
use crate::utils::types::{Address, HashPos};

/// One peer's view of the ring, plus everything needed to maintain it.
///
/// Each mutable field sits behind its own mutex; methods snapshot what they
/// need, drop the guard, and only then touch the network. Instantiating
/// several nodes in one process is supported and is how the integration
/// tests drive multi-peer scenarios.
pub struct ChordNode {
    addr: Address,
    pos: HashPos,
    config: Config,
    successor: Mutex<Address>,
    predecessor: Mutex<Option<Address>>,
    standalone: AtomicBool,
    fingers: Mutex<FingerTable>,
    store: Mutex<Store>,
    /// round-robin cursor for the finger fixer
    next_finger: Mutex<usize>,
    last_refresh: Mutex<Instant>,
    /// last successful liveness probe per peer
    last_seen: Mutex<HashMap<Address, Instant>>,
}

/// Snapshot of the ring view, for the operator surface and the tests.
#[derive(Debug, Clone)]
pub struct NodeSummary {
    pub addr: Address,
    pub pos: HashPos,
    pub successor: Address,
    pub predecessor: Option<Address>,
    pub standalone: bool,
    pub stored_keys: usize,
}

impl ChordNode {
    pub fn new(addr: Address, config: Config, store: Store) -> ChordNode {
        let pos = addr.hash_pos(config.ring_bits);
        let fingers = FingerTable::new(pos, &addr, config.ring_bits);
        ChordNode {
            successor: Mutex::new(addr.clone()),
            predecessor: Mutex::new(None),
            standalone: AtomicBool::new(false),
            fingers: Mutex::new(fingers),
            store: Mutex::new(store),
            next_finger: Mutex::new(0),
            last_refresh: Mutex::new(Instant::now()),
            last_seen: Mutex::new(HashMap::new()),
            addr,
            pos,
            config,
        }
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn pos(&self) -> HashPos {
        self.pos
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn bits(&self) -> u8 {
        self.config.ring_bits
    }

    pub fn successor(&self) -> Address {
        self.successor.lock().unwrap().clone()
    }

    pub fn predecessor(&self) -> Option<Address> {
        self.predecessor.lock().unwrap().clone()
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            addr: self.addr.clone(),
            pos: self.pos,
            successor: self.successor(),
            predecessor: self.predecessor(),
            standalone: self.is_standalone(),
            stored_keys: self.store.lock().unwrap().len(),
        }
    }

    pub fn finger_targets(&self) -> Vec<(HashPos, Address)> {
        self.fingers
            .lock()
            .unwrap()
            .entries()
            .iter()
            .map(|finger| (finger.start(), finger.address().clone()))
            .collect()
    }

    /// The successor doubles as finger[0].
    fn set_successor(&self, address: &Address) {
        *self.successor.lock().unwrap() = address.clone();
        self.fingers.lock().unwrap().set(0, address.clone());
    }

    /// A key belongs here iff it falls on the arc (predecessor, self].
    /// With no predecessor, or with ourselves as predecessor, we own the
    /// whole ring.
    pub fn owns(&self, key_id: HashPos) -> bool {
        let predecessor = self.predecessor();
        match predecessor {
            None => true,
            Some(pred) if pred == self.addr => true,
            Some(pred) => in_half_open_arc(key_id, pred.hash_pos(self.bits()), self.pos),
        }
    }

    /// Liveness with a short memory: a ping that succeeded within the
    /// freshness window vouches for the peer, otherwise probe now.
    pub async fn is_alive(&self, addr: &Address) -> bool {
        if *addr == self.addr {
            return true;
        }
        let window = self.config.liveness_window;
        {
            let seen = self.last_seen.lock().unwrap();
            if let Some(at) = seen.get(addr) {
                if at.elapsed() < window {
                    return true;
                }
            }
        }
        let alive = rpc::ping_node(addr, &self.addr, &self.config).await;
        let mut seen = self.last_seen.lock().unwrap();
        if alive {
            seen.insert(addr.clone(), Instant::now());
        } else {
            seen.remove(addr);
        }
        alive
    }

    /// Resolves the peer responsible for `id`. Never fails: when routing
    /// breaks down the answer degrades to self and stabilize is left to
    /// repair the ring.
    pub async fn find_successor(&self, id: HashPos) -> Address {
        let successor = self.successor();
        if successor == self.addr {
            return self.addr.clone();
        }
        let successor_pos = successor.hash_pos(self.bits());
        if in_half_open_arc(id, self.pos, successor_pos) {
            return successor;
        }
        let next_hop = self.closest_preceding(id).await;
        if next_hop == self.addr {
            return successor;
        }
        match rpc::remote_find_successor(&next_hop, id, &self.config).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Forwarding find_successor({id}) to {next_hop} failed: {e}");
                self.addr.clone()
            }
        }
    }

    /// Highest finger strictly between us and `id` that still answers
    /// pings. Dead fingers are skipped, not repaired here.
    async fn closest_preceding(&self, id: HashPos) -> Address {
        let targets: Vec<Address> = {
            let fingers = self.fingers.lock().unwrap();
            fingers
                .entries()
                .iter()
                .map(|finger| finger.address().clone())
                .collect()
        };
        for address in targets.into_iter().rev() {
            if address == self.addr {
                continue;
            }
            if in_open_arc(address.hash_pos(self.bits()), self.pos, id)
                && self.is_alive(&address).await
            {
                return address;
            }
        }
        self.addr.clone()
    }

    /// Enters the ring. With no known peer this starts a fresh ring of one.
    /// A failed join collapses to the self-ring and reports the error; the
    /// peer keeps serving and can be adopted later via notify.
    pub async fn join(&self, known: Option<Address>) -> Result<(), RpcError> {
        match known {
            None => {
                self.set_successor(&self.addr.clone());
                *self.predecessor.lock().unwrap() = Some(self.addr.clone());
                self.standalone.store(true, Ordering::SeqCst);
                info!("Starting a new ring at {} (position {})", self.addr, self.pos);
                Ok(())
            }
            Some(known) => match self.join_via(&known).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!("Join via {known} failed: {e}");
                    self.set_successor(&self.addr.clone());
                    *self.predecessor.lock().unwrap() = Some(self.addr.clone());
                    Err(e)
                }
            },
        }
    }

    async fn join_via(&self, known: &Address) -> Result<(), RpcError> {
        let found = rpc::remote_find_successor(known, self.pos, &self.config).await?;
        let successor = if found == self.addr {
            known.clone()
        } else {
            found
        };
        self.set_successor(&successor);
        *self.predecessor.lock().unwrap() = None;
        self.standalone.store(false, Ordering::SeqCst);

        self.init_finger_table(known).await;

        match rpc::remote_get_predecessor(&successor, &self.config).await {
            Ok(Some(pred)) if pred != self.addr => {
                *self.predecessor.lock().unwrap() = Some(pred.clone());
                if let Err(e) = rpc::remote_notify(&pred, &self.addr, &self.config).await {
                    debug!("Could not introduce ourselves to predecessor {pred}: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Successor {successor} did not answer get_predecessor: {e}"),
        }

        if let Err(e) = rpc::remote_notify(&successor, &self.addr, &self.config).await {
            warn!("Could not notify successor {successor}: {e}");
        }
        if let Err(e) = self.stabilize().await {
            debug!("Initial stabilize pass failed: {e}");
        }
        info!(
            "Joined ring at {}: successor {}, predecessor {:?}",
            self.addr,
            self.successor(),
            self.predecessor()
        );
        Ok(())
    }

    /// Seeds the finger table through a bootstrap peer. Finger i is reused
    /// from finger i-1 when its start falls short of that target; any
    /// lookup failure leaves the entry at self for the fixer to repair.
    async fn init_finger_table(&self, bootstrap: &Address) {
        let bits = self.bits();
        let starts: Vec<HashPos> = {
            let fingers = self.fingers.lock().unwrap();
            (0..fingers.len())
                .filter_map(|i| fingers.start(i))
                .collect()
        };

        let mut targets: Vec<Address> = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let reused = targets.last().and_then(|prev: &Address| {
                in_half_open_arc(start, self.pos, prev.hash_pos(bits)).then(|| prev.clone())
            });
            let target = match reused {
                Some(prev) => prev,
                None => match rpc::remote_find_successor(bootstrap, start, &self.config).await {
                    Ok(found) => found,
                    Err(e) => {
                        debug!("Finger {i} lookup via {bootstrap} failed: {e}");
                        self.addr.clone()
                    }
                },
            };
            targets.push(target);
        }

        let mut fingers = self.fingers.lock().unwrap();
        for (i, target) in targets.into_iter().enumerate() {
            fingers.set(i, target);
        }
    }

    /// Incoming hint that `candidate` may be our predecessor.
    pub async fn notify(&self, candidate: Address) -> NotifyResponse {
        if self.standalone.swap(false, Ordering::SeqCst) {
            *self.predecessor.lock().unwrap() = Some(candidate.clone());
            self.set_successor(&candidate);
            info!("First contact: {candidate} becomes predecessor and successor");
            return NotifyResponse::Notified {
                old_predecessor: None,
            };
        }
        if candidate == self.addr {
            return NotifyResponse::Rejected;
        }

        let bits = self.bits();
        let candidate_pos = candidate.hash_pos(bits);
        let snapshot = self.predecessor();
        let accept = match &snapshot {
            None => true,
            Some(prev) => {
                let prev_pos = prev.hash_pos(bits);
                in_open_arc(candidate_pos, prev_pos, self.pos)
                    || prev_pos == self.pos
                    || !self.is_alive(prev).await
            }
        };
        if !accept {
            return NotifyResponse::Rejected;
        }

        let mut predecessor = self.predecessor.lock().unwrap();
        if *predecessor != snapshot {
            // another notify landed while we probed; the candidate must
            // beat the value that is there now
            if let Some(current) = predecessor.clone() {
                if !in_open_arc(candidate_pos, current.hash_pos(bits), self.pos) {
                    return NotifyResponse::Rejected;
                }
            }
        }
        let old = predecessor.replace(candidate.clone());
        drop(predecessor);
        if old.as_ref() != Some(&candidate) {
            info!("Adopted {candidate} as predecessor (was {old:?})");
        }
        NotifyResponse::Notified {
            old_predecessor: old,
        }
    }

    /// One stabilize pass: reconcile with the successor's predecessor and
    /// re-announce ourselves. A dead successor is replaced by the first
    /// live finger target, or by self when none answers.
    pub async fn stabilize(&self) -> Result<(), RpcError> {
        let successor = self.successor();
        if successor == self.addr {
            // ring of one; nothing to reconcile until someone notifies us
            return Ok(());
        }

        if !self.is_alive(&successor).await {
            self.fail_over_successor(&successor).await;
            return Ok(());
        }

        let bits = self.bits();
        match rpc::remote_get_predecessor(&successor, &self.config).await {
            Ok(Some(candidate)) if candidate != self.addr => {
                if in_open_arc(
                    candidate.hash_pos(bits),
                    self.pos,
                    successor.hash_pos(bits),
                ) {
                    info!("Stabilize: adopting {candidate} as successor");
                    self.set_successor(&candidate);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Successor {successor} did not answer get_predecessor: {e}"),
        }

        let current = self.successor();
        if current != self.addr {
            match rpc::remote_notify(&current, &self.addr, &self.config).await {
                Ok(NotifyResponse::Notified { .. }) => {}
                Ok(NotifyResponse::Rejected) => {
                    debug!("Successor {current} rejected our notify")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn fail_over_successor(&self, dead: &Address) {
        warn!("Successor {dead} unreachable, failing over");
        let targets: Vec<Address> = {
            let fingers = self.fingers.lock().unwrap();
            fingers
                .entries()
                .iter()
                .map(|finger| finger.address().clone())
                .collect()
        };
        for candidate in targets {
            if candidate == self.addr || candidate == *dead {
                continue;
            }
            if self.is_alive(&candidate).await {
                info!("Failover: new successor {candidate}");
                self.set_successor(&candidate);
                return;
            }
        }
        warn!("No live finger target, successor falls back to self");
        self.set_successor(&self.addr.clone());
    }

    /// One fixer pass: re-resolve a single finger, round-robin. Every
    /// `finger_refresh_interval` the whole table is re-seeded from the
    /// successor instead.
    pub async fn fix_fingers(&self) {
        let refresh_due = {
            self.last_refresh.lock().unwrap().elapsed() >= self.config.finger_refresh_interval
        };
        if refresh_due {
            self.refresh_all_fingers().await;
            *self.last_refresh.lock().unwrap() = Instant::now();
            return;
        }

        let count = self.bits() as usize;
        let index = {
            let mut next = self.next_finger.lock().unwrap();
            let index = *next;
            *next = (index + 1) % count;
            index
        };
        let start = match self.fingers.lock().unwrap().start(index) {
            Some(start) => start,
            None => return,
        };

        let target = self.find_successor(start).await;
        let healthy = target != self.addr && self.is_alive(&target).await;
        debug!("Fixing finger {index} (start {start}) -> {target}");
        let mut fingers = self.fingers.lock().unwrap();
        if healthy {
            fingers.set(index, target);
        } else {
            fingers.set(index, self.addr.clone());
        }
    }

    async fn refresh_all_fingers(&self) {
        let successor = self.successor();
        if successor != self.addr && self.is_alive(&successor).await {
            debug!("Re-seeding finger table from successor {successor}");
            self.init_finger_table(&successor).await;
        } else {
            self.fingers.lock().unwrap().set_all(&self.addr);
        }
    }

    /// Stores `key` here when we own its id, otherwise forwards to the
    /// resolved owner. A degenerate forward target of self keeps the write
    /// locally rather than dropping it.
    pub async fn store_key(&self, key: &str, value: &str) -> OpResponse {
        let key_id = hash_id(key.as_bytes(), self.bits());
        if self.owns(key_id) {
            self.put_local(key, value);
            return OpResponse::success("Key stored successfully");
        }
        let target = self.find_successor(key_id).await;
        if target == self.addr {
            self.put_local(key, value);
            return OpResponse::success("Key stored successfully");
        }
        match rpc::remote_store_key(&target, key, value, &self.config).await {
            Ok(response) => response,
            Err(e) => OpResponse::error(format!("Failed to store key: {e}")),
        }
    }

    fn put_local(&self, key: &str, value: &str) {
        self.store
            .lock()
            .unwrap()
            .put(key.to_owned(), value.to_owned());
    }

    /// The local map is consulted first regardless of ownership, covering
    /// keys that landed here before the ring shifted underneath them.
    pub async fn retrieve_key(&self, key: &str) -> RetrieveResponse {
        if let Some(value) = self.store.lock().unwrap().get(key) {
            return RetrieveResponse::found(value);
        }
        let key_id = hash_id(key.as_bytes(), self.bits());
        if self.owns(key_id) {
            return RetrieveResponse::not_found();
        }
        let target = self.find_successor(key_id).await;
        if target == self.addr {
            return RetrieveResponse::not_found();
        }
        match rpc::remote_retrieve_key(&target, key, &self.config).await {
            Ok(response) => response,
            Err(e) => RetrieveResponse::error(format!("Failed to retrieve key: {e}")),
        }
    }

    pub async fn delete_key(&self, key: &str) -> OpResponse {
        let key_id = hash_id(key.as_bytes(), self.bits());
        if self.owns(key_id) {
            return self.remove_local(key);
        }
        let target = self.find_successor(key_id).await;
        if target == self.addr {
            return self.remove_local(key);
        }
        match rpc::remote_delete_key(&target, key, &self.config).await {
            Ok(response) => response,
            Err(e) => OpResponse::error(format!("Failed to delete key: {e}")),
        }
    }

    fn remove_local(&self, key: &str) -> OpResponse {
        match self.store.lock().unwrap().remove(key) {
            Some(_) => OpResponse::success("Key deleted successfully"),
            None => OpResponse::error("Key not found"),
        }
    }

    /// Dispatches one decoded request to its handler.
    pub async fn handle(&self, command: Command) -> Response {
        match command {
            Command::StoreKey { key, value } => {
                Response::Op(self.store_key(&key, &value).await)
            }
            Command::RetrieveKey { key } => Response::Retrieve(self.retrieve_key(&key).await),
            Command::DeleteKey { key } => Response::Op(self.delete_key(&key).await),
            Command::FindSuccessor { id } => {
                let id = id % ring_size(self.bits());
                Response::FindSuccessor(FindSuccessorResponse {
                    successor: self.find_successor(id).await,
                })
            }
            Command::GetPredecessor => Response::Predecessor(PredecessorResponse {
                predecessor: self.predecessor(),
            }),
            // kept for wire compatibility; no successor-list protocol
            // exists yet, so the list is always empty
            Command::GetSuccessorList => Response::SuccessorList(SuccessorListResponse {
                successor_list: Vec::new(),
            }),
            Command::Notify { predecessor } => Response::Notify(self.notify(predecessor).await),
            Command::Ping => Response::Ping(PingResponse::alive()),
        }
    }
}
