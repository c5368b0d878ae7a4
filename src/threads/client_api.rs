use std::io::{self, BufRead, Write};
use std::process;
use std::sync::Arc;

use log::warn;
use tokio::runtime::Handle;

use crate::node::ChordNode;
use crate::protocol::OpStatus;
use crate::utils::constants::{MAX_KEY_BYTES, MAX_VALUE_BYTES};

/// Interactive operator menu. Runs on its own blocking thread and bridges
/// into the runtime per command; the engine does the routing, this is a
/// plain client of it.
pub fn run_menu(node: Arc<ChordNode>, handle: Handle) {
    print_menu();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("\n> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                warn!("Failed to read input: {e}");
                continue;
            }
            // stdin closed; keep serving without a menu
            None => return,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(rest) = input.strip_prefix("insert|") {
            insert(&node, &handle, rest);
        } else if let Some(key) = input.strip_prefix("get|") {
            get(&node, &handle, key);
        } else if let Some(key) = input.strip_prefix("delete|") {
            delete(&node, &handle, key);
        } else if input == "finger" {
            print_fingers(&node);
        } else if input == "info" {
            print_info(&node);
        } else if input == "exit" {
            process::exit(0);
        } else {
            println!("Invalid command");
        }
    }
}

fn insert(node: &Arc<ChordNode>, handle: &Handle, rest: &str) {
    let Some((key, value)) = rest.split_once(':') else {
        println!("Expected insert|key:value");
        return;
    };
    if key.len() > MAX_KEY_BYTES || value.len() > MAX_VALUE_BYTES {
        println!("Error: key/value too large (limit {MAX_KEY_BYTES} bytes)");
        return;
    }
    let response = handle.block_on(node.store_key(key, value));
    match response.status {
        OpStatus::Success => println!("Success"),
        OpStatus::Error => println!(
            "Error: {}",
            response.message.unwrap_or_else(|| "unknown".into())
        ),
    }
}

fn get(node: &Arc<ChordNode>, handle: &Handle, key: &str) {
    if key.len() > MAX_KEY_BYTES {
        println!("Error: key too large (limit {MAX_KEY_BYTES} bytes)");
        return;
    }
    let response = handle.block_on(node.retrieve_key(key));
    match response.value {
        Some(value) => println!("Value: {value}"),
        None => println!("Not found"),
    }
}

fn delete(node: &Arc<ChordNode>, handle: &Handle, key: &str) {
    if key.len() > MAX_KEY_BYTES {
        println!("Error: key too large (limit {MAX_KEY_BYTES} bytes)");
        return;
    }
    let response = handle.block_on(node.delete_key(key));
    match response.status {
        OpStatus::Success => println!("Success"),
        OpStatus::Error => println!(
            "Error: {}",
            response.message.unwrap_or_else(|| "unknown".into())
        ),
    }
}

fn print_fingers(node: &Arc<ChordNode>) {
    println!("  i | start | target");
    for (i, (start, target)) in node.finger_targets().into_iter().enumerate() {
        println!("{i:>3} | {start:>5} | {target}");
    }
}

fn print_info(node: &Arc<ChordNode>) {
    let summary = node.summary();
    println!("Node ID: {}", summary.pos);
    println!("Address: {}", summary.addr);
    println!("Successor: {}", summary.successor);
    match summary.predecessor {
        Some(predecessor) => println!("Predecessor: {predecessor}"),
        None => println!("Predecessor: none"),
    }
    println!("Standalone: {}", summary.standalone);
    println!("Stored keys: {}", summary.stored_keys);
}

fn print_menu() {
    println!("Commands:");
    println!("  insert|key:value  store a key/value pair");
    println!("  get|key           retrieve a value by key");
    println!("  delete|key        delete a key/value pair");
    println!("  finger            display the finger table");
    println!("  info              display node information");
    println!("  exit              quit");
}
