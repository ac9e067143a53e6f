//! Control-server uplink. This component owns the connection lifecycle:
//! token exchange, WebSocket transport, keepalive watchdog and reconnect
//! scheduling, plus the outbound gateway collaborators send through.

mod auth;
mod backoff;
mod gateway;
#[cfg(test)]
pub(crate) mod testutil;
mod uplink;
mod watchdog;

pub use gateway::Gateway;
pub use uplink::{ConnectionState, Uplink};

pub(crate) use backoff::{BASE_DELAY, ESCALATED_DELAY};
pub(crate) use watchdog::STALL_TIMEOUT;
