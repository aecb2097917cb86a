use serde::{Deserialize, Serialize};

/// Supervisor -> heartbeat worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerCommand {
    Start,
    Stop,
}

/// Heartbeat worker -> supervisor. Carries only its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerSignal {
    Heartbeat,
}
