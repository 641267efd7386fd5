//! Background scheduling: periodic cycles and reconnect triggers.

use crate::connectivity::ConnectivityMonitor;
use crate::engine::SyncEngine;
use crate::remote::RemoteClient;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

pub(crate) enum SchedulerEvent {
    Reconnected,
    Stop,
}

pub(crate) struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerEvent>,
    thread: Option<thread::JoinHandle<()>>,
    subscription: crate::connectivity::SubscriptionId,
}

impl<R, C> SyncEngine<R, C>
where
    R: RemoteClient + 'static,
    C: ConnectivityMonitor + 'static,
{
    /// Starts this engine's scheduler thread.
    ///
    /// The thread runs one cycle immediately, then again whenever the
    /// configured interval elapses or connectivity comes back. With a
    /// zero interval there is no timer; only reconnects (and manual
    /// [`sync`](SyncEngine::sync) calls) trigger cycles. Calling
    /// `start` while already running is a no-op; each engine instance
    /// owns at most one scheduler.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.scheduler_slot().lock();
        if slot.is_some() {
            debug!("scheduler already running");
            return;
        }

        let (sender, receiver) = mpsc::channel();
        let reconnect = sender.clone();
        let subscription = self.connectivity().subscribe(Box::new(move |connected| {
            if connected {
                let _ = reconnect.send(SchedulerEvent::Reconnected);
            }
        }));

        let engine = Arc::clone(self);
        let interval = self.config().sync_interval;
        let thread = thread::spawn(move || {
            info!("sync scheduler started");
            run_cycle(&engine);
            loop {
                let event = if interval.is_zero() {
                    match receiver.recv() {
                        Ok(event) => Some(event),
                        Err(_) => break,
                    }
                } else {
                    match receiver.recv_timeout(interval) {
                        Ok(event) => Some(event),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                };
                match event {
                    Some(SchedulerEvent::Stop) => break,
                    Some(SchedulerEvent::Reconnected) => {
                        debug!("connectivity restored, syncing");
                        run_cycle(&engine);
                    }
                    // Timer tick. Skipped while offline; the reconnect
                    // event will catch us up.
                    None => {
                        if engine.connectivity().is_connected() {
                            run_cycle(&engine);
                        }
                    }
                }
            }
            info!("sync scheduler stopped");
        });

        *slot = Some(SchedulerHandle {
            sender,
            thread: Some(thread),
            subscription,
        });
    }

    /// Stops the scheduler thread and waits for it to exit. Safe to
    /// call repeatedly or without a prior [`start`](SyncEngine::start).
    pub fn stop(&self) {
        let handle = self.scheduler_slot().lock().take();
        let Some(mut handle) = handle else {
            return;
        };
        self.connectivity().unsubscribe(handle.subscription);
        let _ = handle.sender.send(SchedulerEvent::Stop);
        if let Some(thread) = handle.thread.take() {
            if thread.join().is_err() {
                warn!("scheduler thread exited abnormally");
            }
        }
    }
}

fn run_cycle<R: RemoteClient, C: ConnectivityMonitor>(engine: &SyncEngine<R, C>) {
    let report = engine.sync();
    if !report.is_clean() {
        debug!(errors = report.errors.len(), "scheduled cycle had errors");
    }
}
