//! Deployment orchestration
//!
//! Turns a descriptor into a live deployment: connect, upload, send the
//! command sequence, then keep streaming remote output until closed.

pub mod orchestrator;
pub mod state;

pub use orchestrator::Deployment;
pub use state::RunState;
