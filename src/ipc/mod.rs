//! TCP+msgpack IPC transport layer.
//!
//! Clients reach the `mcp` service (initialize, tools/list, tools/call);
//! peer proxies reach the `cluster` service with tool call envelopes. Both
//! share the length-prefixed frame protocol in [`codec`].

pub mod codec;
pub mod handlers;
pub mod router;
pub mod server;

pub use router::route_request;
pub use server::IpcServer;
