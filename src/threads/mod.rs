pub mod client_api;
pub mod fix_fingers;
pub mod stabilize;
pub mod tcp_service;
