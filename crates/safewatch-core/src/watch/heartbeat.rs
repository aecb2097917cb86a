use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use safewatch_proto::worker::{WorkerCommand, WorkerSignal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::capability::IsolatedExecutor;
use crate::state::SharedState;

pub struct HeartbeatWatcher {
    state: SharedState,
    interval: Duration,
}

impl HeartbeatWatcher {
    pub fn new(state: SharedState, interval: Duration) -> Self {
        Self { state, interval }
    }

    pub fn start(self, executor: &mut dyn IsolatedExecutor, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let (cmd_tx, cmd_rx) = std_mpsc::channel::<WorkerCommand>();
        let (sig_tx, sig_rx) = mpsc::unbounded_channel::<WorkerSignal>();
        let interval = self.interval;

        if let Err(e) = executor.spawn_isolated("safewatch-heartbeat", Box::new(move || worker_loop(cmd_rx, sig_tx, interval))) {
            self.state.with(|st| st.log.warn(format!("Background heartbeat unavailable, continuing without it: {}", e)));
            return None;
        }
        let _ = cmd_tx.send(WorkerCommand::Start);
        Some(tokio::spawn(self.run(cmd_tx, sig_rx, cancel)))
    }

    async fn run(
        self,
        commands: std_mpsc::Sender<WorkerCommand>,
        mut signals: mpsc::UnboundedReceiver<WorkerSignal>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(WorkerSignal::Heartbeat) => {
                        self.state.update_live(&cancel, |st| st.log.info("Heartbeat received"));
                    }
                    None => {
                        self.state.update_live(&cancel, |st| st.log.warn("Heartbeat worker stopped"));
                        break;
                    }
                },
            }
        }
        let _ = commands.send(WorkerCommand::Stop);
        debug!("heartbeat watcher stopped");
    }
}

/// Body of the isolated worker. Idle until `Start`, then ticks until `Stop`
/// or until either side of the channel pair goes away.
pub(crate) fn worker_loop(
    commands: std_mpsc::Receiver<WorkerCommand>,
    signals: mpsc::UnboundedSender<WorkerSignal>,
    interval: Duration,
) {
    loop {
        match commands.recv() {
            Ok(WorkerCommand::Start) => break,
            Ok(WorkerCommand::Stop) | Err(_) => return,
        }
    }

    loop {
        match commands.recv_timeout(interval) {
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                if signals.send(WorkerSignal::Heartbeat).is_err() {
                    return;
                }
            }
            Ok(WorkerCommand::Start) => {}
            Ok(WorkerCommand::Stop) | Err(std_mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}
