pub mod registry;
pub mod shutdown;

pub use registry::{
    aggregate_liveness, spawn_liveness_task, AgentConnection, ConnectionId, ConnectionRegistry,
    LivenessSnapshot, DEFAULT_LIVENESS_TICK, DEFAULT_LIVENESS_WINDOW,
};
pub use shutdown::{wait_for_os_signal, Shutdown, ShutdownListener, ShutdownSignal};
