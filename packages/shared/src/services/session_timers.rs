use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::player::PlayerId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    StartGrace,
    Deadline,
    /// Bounded wait after the deadline for a submit made in time.
    Overtime,
    Disconnect(PlayerId),
}

/// Cancellable timers scoped to one session. Scheduling a key that is already
/// armed replaces it. `cancel_all` runs on every terminal transition.
#[derive(Default)]
pub struct SessionTimers {
    handles: Mutex<HashMap<TimerKey, JoinHandle<()>>>,
    closed: Mutex<bool>,
}

impl SessionTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, key: TimerKey, after: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.lock().map(|closed| *closed).unwrap_or(true) {
            debug!("Ignoring {:?} timer on a closed session", key);
            return;
        }
        // Detached: a handler that calls cancel_all must not abort itself.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tokio::spawn(task);
        });
        if let Ok(mut handles) = self.handles.lock() {
            if let Some(previous) = handles.insert(key, handle) {
                previous.abort();
            }
        }
    }

    pub fn cancel(&self, key: &TimerKey) -> bool {
        match self.handles.lock() {
            Ok(mut handles) => match handles.remove(key) {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Stops every timer and refuses new ones.
    pub fn cancel_all(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
        if let Ok(mut handles) = self.handles.lock() {
            for (key, handle) in handles.drain() {
                debug!("Cancelling {:?} timer", key);
                handle.abort();
            }
        }
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.handles
            .lock()
            .map(|handles| handles.get(key).is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}
