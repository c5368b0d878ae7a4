use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn, LevelFilter};
use tokio::net::TcpListener;

use ringkv::kv::Store;
use ringkv::node::ChordNode;
use ringkv::threads::{client_api, fix_fingers, stabilize, tcp_service};
use ringkv::utils::cli::Cli;
use ringkv::utils::config::Config;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    simple_logger::SimpleLogger::new()
        .env()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid config {}: {e}", path.display());
                exit(1);
            }
        },
        None => Config::default(),
    };

    let self_addr = args.self_addr();

    if let Err(e) = std::fs::create_dir_all(&config.data_store_dir) {
        error!(
            "Cannot create data dir {}: {e}",
            config.data_store_dir.display()
        );
        exit(1);
    }
    let snapshot = config.data_store_dir.join(format!(
        "node_data_{}_{}.json",
        self_addr.host, self_addr.port
    ));
    let store = Store::open(snapshot);

    let listener = match TcpListener::bind((self_addr.host.as_str(), self_addr.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot bind {self_addr}: {e}");
            exit(1);
        }
    };

    let node = Arc::new(ChordNode::new(self_addr, config, store));

    if let Err(e) = node.join(args.known_addr()).await {
        warn!("Serving as a ring of one until a peer adopts us: {e}");
    }

    info!("Starting listener and maintenance tasks");
    tokio::spawn(tcp_service::serve(node.clone(), listener));
    tokio::spawn(stabilize::run(node.clone()));
    tokio::spawn(fix_fingers::run(node.clone()));

    let menu_node = node.clone();
    let handle = tokio::runtime::Handle::current();
    std::thread::spawn(move || client_api::run_menu(menu_node, handle));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt, shutting down"),
        Err(e) => error!("Signal handler failed: {e}"),
    }
    // in-flight handlers are abandoned; the snapshot's atomic rename keeps
    // completed writes durable
    exit(0);
}
