pub mod connection_gate;
pub mod refresh;

pub use connection_gate::{ConnectionGate, GatePermit, GateStats};
pub use refresh::spawn_config_refresh;
