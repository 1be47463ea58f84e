//! # Showgraph Core
//!
//! Node graph model and per-tick evaluation engine for a multi-client show
//! controller driving lights, screens and audio.
//!
//! ## Architecture
//!
//! A show is a graph of node instances wired port to port:
//! - **Input nodes** produce constants and the show clock
//! - **Math / Logic / Color nodes** transform values
//! - **Media nodes** track playback through finish pulses
//! - **Group nodes** (gate, proxy) mark the boundaries of node groups
//! - **Output nodes** are sinks that emit dispatches to client devices
//!
//! Data ports form a DAG that is evaluated in dependency order once per tick.
//! Sink ports are delivered after the data pass and never order evaluation.
//!
//! ## Example
//!
//! ```text
//! [Oscillator] ──► [Map Range] ──► [Mix] ──► [Light]
//!   [Color] ─────────────────────►│
//! ```
//!
//! ## Modules
//!
//! - `ports` - Port types and compatibility
//! - `value` - Runtime values
//! - `config` - Node config schemas and lazy validation
//! - `registry` - Node definitions and the registry
//! - `nodes` - Built-in node library
//! - `graph` - Graph structure with nodes and connections
//! - `groups` - Group model and normalization
//! - `interpreter` - Tick evaluation engine
//! - `pulses` - Media finish-pulse bridge
//! - `dispatch` - Side effects emitted by sinks
//! - `wasm` - WebAssembly bindings for the editor

mod coerce;
mod config;
mod dispatch;
mod error;
mod graph;
mod groups;
mod interpreter;
mod nodes;
mod ports;
mod pulses;
mod registry;
mod value;
pub mod wasm;

pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use graph::*;
pub use groups::*;
pub use interpreter::*;
pub use nodes::*;
pub use ports::*;
pub use pulses::*;
pub use registry::*;
pub use value::*;
