//! Lobby and ready-room orchestration

pub mod registry;

pub use registry::{LobbyError, LobbyOutcome, LobbyRegistry};
