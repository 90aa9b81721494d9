//! Kurento Media Server Anbindung

mod client;
pub mod jsonrpc;

pub use client::KurentoClient;
