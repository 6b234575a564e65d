//! Application Layer - Ports and the consumer-facing feed.
//!
//! Ports describe what the connection manager needs from the outside world
//! (a socket, a timer). The feed wires those ports to the domain and exposes
//! the result to dashboard code.

/// Port interfaces for transports and timers.
pub mod ports;

/// Mountable dashboard feed.
pub mod feed;
