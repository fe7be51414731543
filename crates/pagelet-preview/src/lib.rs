//! The preview controller.
//!
//! One [`PreviewController`] backs one editing session. Every source edit
//! runs the transpile and execute stages to completion and atomically
//! replaces the displayed [`PreviewResult`].

pub mod controller;

pub use controller::{
    Generation, PreviewController, PreviewError, PreviewResult, PreviewState, RunTicket, Stage,
};
