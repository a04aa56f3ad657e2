use crate::model::{APPLICATIONS, APPLICATION_STEPS};
use chrono::Local;
use pipeline_realtime::{
    ChangeEvent, ChangeTransport, ConnectionStatus, SubscriptionManager, WatchSet,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub const MONITOR_LOG_CAPACITY: usize = 10;

#[derive(Debug, Default)]
struct MonitorLog {
    entries: VecDeque<String>,
}

impl MonitorLog {
    fn push(&mut self, message: &str) {
        let line = format!("{}: {}", Local::now().format("%H:%M:%S"), message);
        self.entries.push_front(line);
        self.entries.truncate(MONITOR_LOG_CAPACITY);
    }
}

/// Debug view of the change feed: counts deliveries and keeps the most
/// recent log lines, newest first.
pub struct RealtimeMonitor {
    manager: SubscriptionManager,
    callbacks: Arc<AtomicU64>,
    log: Arc<Mutex<MonitorLog>>,
    status_task: JoinHandle<()>,
}

impl RealtimeMonitor {
    /// Must be called from within a tokio runtime.
    pub fn mount(transport: Arc<dyn ChangeTransport>) -> Self {
        let callbacks = Arc::new(AtomicU64::new(0));
        let log = Arc::new(Mutex::new(MonitorLog::default()));
        let mut manager = SubscriptionManager::new(transport);

        let count = callbacks.clone();
        let sink = log.clone();
        manager.configure(
            WatchSet::from([APPLICATIONS, APPLICATION_STEPS]),
            move |event: &ChangeEvent| {
                count.fetch_add(1, Ordering::SeqCst);
                record(
                    &sink,
                    &format!("Change callback triggered by {}", event.resource),
                );
                Ok(())
            },
            true,
        );

        let mut status_rx = manager.status_receiver();
        let sink = log.clone();
        let initial = *status_rx.borrow_and_update();
        record(&sink, &format!("Connection status changed to: {}", initial));
        let status_task = tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                record(&sink, &format!("Connection status changed to: {}", status));
            }
        });

        Self {
            manager,
            callbacks,
            log,
            status_task,
        }
    }

    pub fn callback_count(&self) -> u64 {
        self.callbacks.load(Ordering::SeqCst)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    /// Log lines, newest first.
    pub fn logs(&self) -> Vec<String> {
        let log = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        log.entries.iter().cloned().collect()
    }
}

fn record(log: &Mutex<MonitorLog>, message: &str) {
    log.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(message);
}

impl Drop for RealtimeMonitor {
    fn drop(&mut self) {
        self.status_task.abort();
    }
}
