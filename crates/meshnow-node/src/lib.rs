//! Demo driver tying the transport, handshake, and OTA crates into a
//! runnable mesh node over a simulated radio. The `meshnow-node` binary is a
//! thin CLI wrapper over [`demo::run_demo`]; integration tests in `tests/`
//! exercise the same entry point directly.

pub mod context;
pub mod demo;
pub mod file_store;

pub use demo::{mac_for, run_demo, DemoReport};
pub use file_store::FileStore;
