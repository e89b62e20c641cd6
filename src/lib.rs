//! dllgraph - DLL load graph reconstruction from LoadLibrary call traces
//!
//! This library turns raw traces of Windows library-loading calls into a
//! module dependency graph. Enter and Return events are paired by a content
//! fingerprint, low-level loader calls are re-attributed to their true caller
//! from stack snapshots, and repeated loader probes for the same DLL are
//! reduced to one outcome per dependency.
//!
//! Two trace sources are supported: the JSON-lines log written by the
//! instrumentation library and loader-snap output captured under the debugger.

pub mod aggregate;
pub mod attribution;
pub mod call_graph;
pub mod cli;
pub mod config;
pub mod correlator;
pub mod diagnostics;
pub mod dot_output;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod json_output;
pub mod normalize;
pub mod pipeline;
pub mod summary;
pub mod win32_error;
