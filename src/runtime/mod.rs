//! # Runtime Module
//!
//! Runtime components of the operator: initialization, the UIPlugin watch
//! loop and its error policy, and the trigger-driven loop of the install
//! pipeline.

pub mod error_policy;
pub mod initialization;
pub mod trigger_loop;
pub mod triggers;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use trigger_loop::*;
pub use triggers::*;
pub use watch_loop::*;
