//! Pincraft IPC
//!
//! The daemon's local control surface: JSON-RPC 2.0 over a Unix socket,
//! one request and one response per line. Clients pull snapshots rather
//! than subscribing to pushes; the socket path comes from the daemon
//! config.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{ClientError, DaemonClient};
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use server::{IpcHandler, IpcServer};
