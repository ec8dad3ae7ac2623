//! Listener fan-out.
//!
//! Listeners are notified outside the registry lock, so they may register or
//! remove listeners (or drive the monitor) from inside a callback. A listener
//! that returns an error or panics is logged and skipped; delivery to the rest
//! carries on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::events::{FileEvent, MonitorEvent, StatusEvent};

pub trait MonitorListener: Send + Sync {
    fn directory_activity(&self, event: &FileEvent) -> Result<()>;

    fn status_changed(&self, _event: &StatusEvent) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct EventDispatcher {
    listeners: Mutex<Vec<Arc<dyn MonitorListener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn MonitorListener>) {
        self.registry().push(listener);
    }

    /// Remove a previously added listener. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn MonitorListener>) -> bool {
        let mut listeners = self.registry();
        let before = listeners.len();
        listeners.retain(|registered| !Arc::ptr_eq(registered, listener));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.registry().len()
    }

    pub fn clear(&self) {
        self.registry().clear();
    }

    /// Deliver a file event. Returns the number of listeners that accepted it.
    pub fn directory_activity(&self, event: &FileEvent) -> usize {
        self.notify("directory_activity", |listener| listener.directory_activity(event))
    }

    /// Deliver a status event. Returns the number of listeners that accepted it.
    pub fn status_changed(&self, event: &StatusEvent) -> usize {
        self.notify("status_changed", |listener| listener.status_changed(event))
    }

    fn notify<F>(&self, callback: &str, deliver: F) -> usize
    where
        F: Fn(&dyn MonitorListener) -> Result<()>,
    {
        let listeners: Vec<_> = self.registry().clone();
        let mut delivered = 0;

        for listener in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref())))
                .unwrap_or_else(|_| Err(anyhow!("listener panicked")));

            match outcome {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!("Listener failed in {}: {:#}", callback, err),
            }
        }

        delivered
    }

    fn registry(&self) -> MutexGuard<'_, Vec<Arc<dyn MonitorListener>>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Forwards every callback into a channel as a [`MonitorEvent`].
pub struct ChannelListener {
    sender: Mutex<Sender<MonitorEvent>>,
}

impl ChannelListener {
    pub fn new(sender: Sender<MonitorEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }

    fn send(&self, event: MonitorEvent) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sender
            .send(event)
            .map_err(|_| anyhow!("event receiver has been dropped"))
    }
}

impl MonitorListener for ChannelListener {
    fn directory_activity(&self, event: &FileEvent) -> Result<()> {
        self.send(MonitorEvent::Activity(event.clone()))
    }

    fn status_changed(&self, event: &StatusEvent) -> Result<()> {
        self.send(MonitorEvent::Status(event.clone()))
    }
}
