use std::path::PathBuf;

use clap::Parser;

use crate::utils::types::Address;

/// A peer in a Chord-style DHT key/value ring.
#[derive(Parser, Debug)]
#[command(name = "ringkv", version, about)]
pub struct Cli {
    /// Address to listen on
    pub ip: String,

    /// Port to listen on
    pub port: u16,

    /// Address of a ring member to join through
    #[arg(requires = "known_port")]
    pub known_ip: Option<String>,

    /// Port of the ring member to join through
    pub known_port: Option<u16>,

    /// Path to an INI config file with tunables
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn self_addr(&self) -> Address {
        Address::new(self.ip.clone(), self.port)
    }

    pub fn known_addr(&self) -> Option<Address> {
        match (&self.known_ip, self.known_port) {
            (Some(ip), Some(port)) => Some(Address::new(ip.clone(), port)),
            _ => None,
        }
    }
}
