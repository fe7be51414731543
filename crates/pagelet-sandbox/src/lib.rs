//! Sandboxed evaluation of compiled component artifacts.
//!
//! This crate owns the capability registry (the complete, ordered set of
//! names sandboxed code may use), the interpreter that evaluates artifacts
//! against it, and the renderer that turns the returned element into a
//! [`HostTree`].
//!
//! ```text
//! CompiledArtifact --execute--> Execution --Mount::new--> HostTree
//!                                                |
//!                           dispatch / advance_time / remount
//! ```

mod builtins;
mod capabilities;
pub mod config;
pub mod error;
pub mod executor;
pub mod host;
pub mod interp;
pub mod registry;
pub mod render;
pub mod value;

pub use config::{ExecuteOptions, SandboxLimits, WindowSize};
pub use error::{ExecuteError, RenderError};
pub use executor::{spawn_sandbox_thread, Execution, SandboxExecutor, SANDBOX_STACK_SIZE};
pub use host::{HostEvent, LogLevel};
pub use registry::{Capability, CapabilityBinding, CapabilityRegistry, REGISTRY_VERSION};
pub use render::{HostNode, HostTree, Mount, MAX_RENDERS};
