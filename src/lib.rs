//! Interactive debugger for a multithreaded rule engine.
//!
//! The engine reports every function invocation to a [`debugger::DebugController`], which
//! suspends threads on breakpoints and steps. A remote client drives the controller through a
//! line based command channel and receives notifications over a framed event channel.

pub mod config;
pub mod debugger;
pub mod protocol;
pub mod server;
pub mod sim;
