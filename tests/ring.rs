//! Whole-ring scenarios over real sockets: every peer is a full engine
//! with its own listener on an ephemeral 127.0.0.1 port. Maintenance
//! passes are driven explicitly so the tests stay deterministic.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use ringkv::kv::Store;
use ringkv::node::ChordNode;
use ringkv::protocol::OpResponse;
use ringkv::rpc;
use ringkv::threads::tcp_service;
use ringkv::utils::config::Config;
use ringkv::utils::crypto::{hash_id, in_half_open_arc};
use ringkv::utils::types::{Address, HashPos};

fn test_config() -> Config {
    Config {
        connection_timeout: Duration::from_millis(500),
        max_retries: 2,
        retry_delay: Duration::from_millis(20),
        // force every liveness check onto the network
        liveness_window: Duration::from_millis(0),
        ..Config::default()
    }
}

/// Binds a fresh engine on an ephemeral port and starts its listener.
/// Positions in `avoid` are re-rolled so multi-peer tests never collide
/// on the 2^10 ring.
async fn spawn_node(dir: &Path, avoid: &[HashPos]) -> (Arc<ChordNode>, JoinHandle<()>) {
    loop {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let addr = Address::new("127.0.0.1", port);
        if avoid.contains(&addr.hash_pos(10)) {
            continue;
        }
        let store = Store::open(dir.join(format!("node_data_{}_{}.json", addr.host, addr.port)));
        let node = Arc::new(ChordNode::new(addr, test_config(), store));
        let serve = tokio::spawn(tcp_service::serve(node.clone(), listener));
        return (node, serve);
    }
}

async fn spawn_joined_pair(dir: &Path) -> (Arc<ChordNode>, Arc<ChordNode>, JoinHandle<()>) {
    let (a, _serve_a) = spawn_node(dir, &[]).await;
    a.join(None).await.unwrap();

    let (b, serve_b) = spawn_node(dir, &[a.pos()]).await;
    b.join(Some(a.addr().clone())).await.unwrap();

    for _ in 0..3 {
        b.stabilize().await.unwrap();
        a.stabilize().await.unwrap();
    }
    (a, b, serve_b)
}

#[tokio::test]
async fn solo_peer_serves_crud_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (node, _serve) = spawn_node(dir.path(), &[]).await;
    node.join(None).await.unwrap();

    let config = test_config();
    let addr = node.addr().clone();

    let stored = rpc::remote_store_key(&addr, "foo", "1", &config).await.unwrap();
    assert!(stored.is_success());

    let fetched = rpc::remote_retrieve_key(&addr, "foo", &config).await.unwrap();
    assert_eq!(fetched.value.as_deref(), Some("1"));

    let deleted = rpc::remote_delete_key(&addr, "foo", &config).await.unwrap();
    assert!(deleted.is_success());

    let missing = rpc::remote_retrieve_key(&addr, "foo", &config).await.unwrap();
    assert!(!missing.is_success());
    assert_eq!(missing.message.as_deref(), Some("Key not found"));
}

#[tokio::test]
async fn unknown_commands_get_the_invalid_command_answer() {
    let dir = tempfile::tempdir().unwrap();
    let (node, _serve) = spawn_node(dir.path(), &[]).await;
    node.join(None).await.unwrap();

    let config = test_config();
    let request = serde_json::json!({"command": "drop_everything"});
    let response: OpResponse = rpc::call(node.addr(), &request, &config).await.unwrap();
    assert!(!response.is_success());
    assert_eq!(response.message.as_deref(), Some("Invalid command"));
}

#[tokio::test]
async fn two_peers_converge_on_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, _serve_b) = spawn_joined_pair(dir.path()).await;

    assert_eq!(a.successor(), *b.addr());
    assert_eq!(b.successor(), *a.addr());
    assert_eq!(a.predecessor(), Some(b.addr().clone()));
    assert_eq!(b.predecessor(), Some(a.addr().clone()));
    assert!(!a.is_standalone());
    assert!(!b.is_standalone());
}

#[tokio::test]
async fn stores_route_through_the_non_owner() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, _serve_b) = spawn_joined_pair(dir.path()).await;
    let config = test_config();

    let key = "alpha";
    let key_id = hash_id(key.as_bytes(), 10);
    let (owner, other) = if in_half_open_arc(key_id, b.pos(), a.pos()) {
        (a, b)
    } else {
        (b, a)
    };

    // the non-owner must forward the write to the owner
    let stored = rpc::remote_store_key(other.addr(), key, "x", &config)
        .await
        .unwrap();
    assert!(stored.is_success());
    assert_eq!(
        rpc::remote_retrieve_key(owner.addr(), key, &config)
            .await
            .unwrap()
            .value
            .as_deref(),
        Some("x")
    );

    // and a retrieve through either peer resolves the same value
    assert_eq!(
        rpc::remote_retrieve_key(other.addr(), key, &config)
            .await
            .unwrap()
            .value
            .as_deref(),
        Some("x")
    );
}

#[tokio::test]
async fn fingers_settle_on_the_true_owners() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, _serve_b) = spawn_joined_pair(dir.path()).await;

    for _ in 0..10 {
        a.fix_fingers().await;
    }
    for (start, target) in a.finger_targets() {
        let expected = if in_half_open_arc(start, a.pos(), b.pos()) {
            b.addr().clone()
        } else {
            a.addr().clone()
        };
        assert_eq!(target, expected, "finger start {start}");
    }
}

#[tokio::test]
async fn dead_successor_falls_back_to_self() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, serve_b) = spawn_joined_pair(dir.path()).await;
    assert_eq!(a.successor(), *b.addr());

    // kill B's listener; its port now refuses connections
    serve_b.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;

    for _ in 0..2 {
        let _ = a.stabilize().await;
    }
    assert_eq!(a.successor(), *a.addr());

    // the survivor keeps serving writes and reads
    let config = test_config();
    let stored = rpc::remote_store_key(a.addr(), "after-failover", "ok", &config)
        .await
        .unwrap();
    assert!(stored.is_success());
    let fetched = rpc::remote_retrieve_key(a.addr(), "after-failover", &config)
        .await
        .unwrap();
    assert_eq!(fetched.value.as_deref(), Some("ok"));
}

#[tokio::test]
async fn parallel_inserts_across_two_peers_keep_every_key() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, _serve_b) = spawn_joined_pair(dir.path()).await;
    let config = test_config();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..40u32 {
        let target = if i % 2 == 0 {
            a.addr().clone()
        } else {
            b.addr().clone()
        };
        let config = config.clone();
        tasks.spawn(async move {
            let key = format!("key{i}");
            let value = format!("value{i}");
            let response = rpc::remote_store_key(&target, &key, &value, &config)
                .await
                .unwrap();
            assert!(response.is_success(), "insert of {key} failed");
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    // read each key back through the peer it was NOT sent to
    for i in 0..40u32 {
        let target = if i % 2 == 0 {
            b.addr().clone()
        } else {
            a.addr().clone()
        };
        let response = rpc::remote_retrieve_key(&target, &format!("key{i}"), &config)
            .await
            .unwrap();
        assert_eq!(
            response.value.as_deref(),
            Some(format!("value{i}").as_str()),
            "key{i} lost"
        );
    }
}
