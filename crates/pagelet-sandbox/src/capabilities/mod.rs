//! Capability implementations.
//!
//! Each registry slot materializes into one of these values. They are the
//! only way sandboxed code reaches behavior beyond the language built-ins.

pub(crate) mod native;
pub(crate) mod navigation;
pub(crate) mod react;
