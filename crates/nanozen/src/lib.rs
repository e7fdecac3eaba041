//! `nanozen` is a small-footprint publish/subscribe protocol engine speaking a
//! Zenoh-family wire protocol, aimed at constrained devices: the engine core
//! makes no heap allocation in steady state, every table is a fixed-capacity
//! array sized by const generics on [`Engine`], and all session/conduit state
//! lives in one struct a driver advances explicitly via [`Engine::loop_once`].

mod arena;
mod codec;
mod conduit;
mod config;
mod declare;
mod engine;
mod error;
mod heap;
mod packer;
mod peer;
mod registry;
mod seqnum;
mod session;
mod wire;

pub use config::{EngineConfig, LatencyBudget, TransportMode};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use registry::ResId;
pub use session::SessionState;

pub use nanozen_timing as timing;
pub use nanozen_transport as transport;
pub use nanozen_utils as utils;
pub use tracing;
