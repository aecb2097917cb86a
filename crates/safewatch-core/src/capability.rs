use std::time::Duration;

use safewatch_proto::signal::{ActivityKind, ConnectionInfo, PositionFix};
use tokio::sync::{mpsc, watch};

use crate::error::{PositionError, WatchError};

pub type PositionFeed = mpsc::Receiver<Result<PositionFix, PositionError>>;
/// Current metadata plus change notification.
pub type ConnectionFeed = watch::Receiver<ConnectionInfo>;
pub type OnlineFeed = watch::Receiver<bool>;
pub type ActivityFeed = mpsc::Receiver<ActivityKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Readings older than this are not delivered.
    pub maximum_age: Duration,
    /// How long to wait for a fix before reporting a timeout.
    pub timeout: Duration,
}

pub trait PositionProvider: Send {
    fn watch_position(&mut self, opts: PositionOptions) -> Result<PositionFeed, WatchError>;
}

pub trait ConnectionProvider: Send {
    fn connection(&mut self) -> Result<ConnectionFeed, WatchError>;
}

pub trait OnlineProvider: Send {
    fn online(&mut self) -> Result<OnlineFeed, WatchError>;
}

pub trait ActivityProvider: Send {
    fn activity(&mut self) -> Result<ActivityFeed, WatchError>;
}

/// Runs a job in an execution context isolated from the monitor's runtime.
pub trait IsolatedExecutor: Send {
    fn spawn_isolated(&mut self, name: &str, job: Box<dyn FnOnce() + Send>) -> Result<(), WatchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl PositionProvider for Unavailable {
    fn watch_position(&mut self, _opts: PositionOptions) -> Result<PositionFeed, WatchError> {
        Err(WatchError::CapabilityUnavailable("geolocation"))
    }
}

impl ConnectionProvider for Unavailable {
    fn connection(&mut self) -> Result<ConnectionFeed, WatchError> {
        Err(WatchError::CapabilityUnavailable("network information"))
    }
}

impl OnlineProvider for Unavailable {
    fn online(&mut self) -> Result<OnlineFeed, WatchError> {
        Err(WatchError::CapabilityUnavailable("online state"))
    }
}

impl ActivityProvider for Unavailable {
    fn activity(&mut self) -> Result<ActivityFeed, WatchError> {
        Err(WatchError::CapabilityUnavailable("input events"))
    }
}

impl IsolatedExecutor for Unavailable {
    fn spawn_isolated(&mut self, _name: &str, _job: Box<dyn FnOnce() + Send>) -> Result<(), WatchError> {
        Err(WatchError::CapabilityUnavailable("background worker"))
    }
}

/// A feed built by the caller. Can be opened once.
#[derive(Debug)]
pub struct Injected<F>(Option<F>);

impl<F> Injected<F> {
    pub fn new(feed: F) -> Self {
        Self(Some(feed))
    }

    fn take(&mut self, name: &'static str) -> Result<F, WatchError> {
        self.0.take().ok_or(WatchError::CapabilityUnavailable(name))
    }
}

impl PositionProvider for Injected<PositionFeed> {
    fn watch_position(&mut self, _opts: PositionOptions) -> Result<PositionFeed, WatchError> {
        self.take("geolocation")
    }
}

impl ConnectionProvider for Injected<ConnectionFeed> {
    fn connection(&mut self) -> Result<ConnectionFeed, WatchError> {
        self.take("network information")
    }
}

impl OnlineProvider for Injected<OnlineFeed> {
    fn online(&mut self) -> Result<OnlineFeed, WatchError> {
        self.take("online state")
    }
}

impl ActivityProvider for Injected<ActivityFeed> {
    fn activity(&mut self) -> Result<ActivityFeed, WatchError> {
        self.take("input events")
    }
}

/// Dedicated OS thread per job.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsThreads;

impl IsolatedExecutor for OsThreads {
    fn spawn_isolated(&mut self, name: &str, job: Box<dyn FnOnce() + Send>) -> Result<(), WatchError> {
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(job)
            .map(|_| ())
            .map_err(|e| WatchError::TransientReadFailure { source_name: "background worker", detail: e.to_string() })
    }
}
