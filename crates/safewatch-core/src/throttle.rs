use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Slot<T> {
    last_run: Option<Instant>,
    pending: Option<T>,
    trailing: bool,
}

/// Leading-edge throttle. Calls within `interval` of the last run collapse
/// into one trailing call with the newest argument.
pub struct Throttle<T> {
    interval: Duration,
    slot: Arc<Mutex<Slot<T>>>,
    callback: Arc<dyn Fn(T) + Send + Sync>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Throttle<T> {
    /// The trailing call is dropped once `parent` (or this throttle) is cancelled.
    pub fn new(interval: Duration, parent: &CancellationToken, callback: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            interval,
            slot: Arc::new(Mutex::new(Slot { last_run: None, pending: None, trailing: false })),
            callback: Arc::new(callback),
            cancel: parent.child_token(),
        }
    }

    pub fn call(&self, arg: T) {
        if self.cancel.is_cancelled() {
            return;
        }
        let now = Instant::now();
        let mut slot = lock(&self.slot);

        let recent = slot.last_run.is_some_and(|t| now.duration_since(t) < self.interval);
        if !recent && !slot.trailing {
            slot.last_run = Some(now);
            drop(slot);
            (self.callback)(arg);
            return;
        }

        slot.pending = Some(arg);
        if slot.trailing {
            return;
        }
        slot.trailing = true;
        let due = slot.last_run.unwrap_or(now) + self.interval;
        drop(slot);

        let slot = self.slot.clone();
        let callback = self.callback.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(due) => {
                    let arg = {
                        let mut s = lock(&slot);
                        s.trailing = false;
                        s.last_run = Some(Instant::now());
                        s.pending.take()
                    };
                    if let Some(arg) = arg {
                        if !cancel.is_cancelled() {
                            callback(arg);
                        }
                    }
                }
            }
        });
    }

    /// Drops any parked trailing call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for Throttle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
