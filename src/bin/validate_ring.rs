//! Connects to running peers over the wire protocol and checks that their
//! views form one consistent ring: successor/predecessor duality around
//! the sorted positions, and finger resolution against the true owners.

use std::process::exit;

use clap::Parser;

use ringkv::protocol::{Command, PingResponse};
use ringkv::rpc;
use ringkv::utils::config::Config;
use ringkv::utils::crypto::ring_size;
use ringkv::utils::types::{Address, HashPos};

#[derive(Parser, Debug)]
#[command(name = "validate_ring", about = "Check ring invariants of running peers")]
struct Cli {
    /// Peer addresses as host:port
    #[arg(required = true)]
    peers: Vec<String>,

    /// Ring width m the peers run with
    #[arg(short, long, default_value_t = 10)]
    bits: u8,
}

#[derive(Debug)]
struct PeerView {
    addr: Address,
    pos: HashPos,
    successor: Address,
    predecessor: Option<Address>,
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    let config = Config {
        ring_bits: args.bits,
        ..Config::default()
    };

    let mut views = Vec::new();
    for peer in &args.peers {
        let addr: Address = match peer.parse() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("{e}");
                exit(2);
            }
        };
        let pos = addr.hash_pos(args.bits);

        let alive = rpc::call::<_, PingResponse>(&addr, &Command::Ping, &config)
            .await
            .map(|response| response.is_alive())
            .unwrap_or(false);
        if !alive {
            eprintln!("Peer {addr} does not answer pings");
            exit(1);
        }

        let predecessor = match rpc::remote_get_predecessor(&addr, &config).await {
            Ok(predecessor) => predecessor,
            Err(e) => {
                eprintln!("Peer {addr} did not answer get_predecessor: {e}");
                exit(1);
            }
        };
        // the successor of pos + 1 as seen by the peer itself is its successor
        let successor =
            match rpc::remote_find_successor(&addr, (pos + 1) % ring_size(args.bits), &config)
                .await
            {
                Ok(successor) => successor,
                Err(e) => {
                    eprintln!("Peer {addr} did not answer find_successor: {e}");
                    exit(1);
                }
            };

        views.push(PeerView {
            addr,
            pos,
            successor,
            predecessor,
        });
    }

    views.sort_by_key(|view| view.pos);
    let mut valid = true;

    for i in 0..views.len() {
        let current = &views[i];
        let next = &views[(i + 1) % views.len()];

        if current.successor != next.addr {
            eprintln!(
                "Node ({}, {}): successor is {}, expected {}",
                current.pos, current.addr, current.successor, next.addr
            );
            valid = false;
        }
        match &next.predecessor {
            Some(predecessor) if *predecessor == current.addr => {}
            other => {
                eprintln!(
                    "Node ({}, {}): predecessor is {:?}, expected {}",
                    next.pos, next.addr, other, current.addr
                );
                valid = false;
            }
        }
    }

    for view in &views {
        for i in 0..args.bits {
            let start = (view.pos + (1u64 << i)) % ring_size(args.bits);
            let expected = owner_of(start, &views);
            match rpc::remote_find_successor(&view.addr, start, &config).await {
                Ok(answer) if answer == expected.addr => {}
                Ok(answer) => {
                    eprintln!(
                        "Node ({}, {}): finger {} (start {}) resolves to {}, but ({}, {}) owns it",
                        view.pos, view.addr, i, start, answer, expected.pos, expected.addr
                    );
                    valid = false;
                }
                Err(e) => {
                    eprintln!(
                        "Node ({}, {}): finger {} lookup failed: {e}",
                        view.pos, view.addr, i
                    );
                    valid = false;
                }
            }
        }
    }

    if valid {
        eprintln!("Looks good!");
    } else {
        eprintln!("Ring is inconsistent!");
        exit(1);
    }
}

/// First peer at or clockwise past `id`, wrapping to the lowest position.
fn owner_of<'a>(id: HashPos, sorted_views: &'a [PeerView]) -> &'a PeerView {
    sorted_views
        .iter()
        .find(|view| view.pos >= id)
        .unwrap_or(&sorted_views[0])
}
