//! Periodic progress reporting for long scans.
//!
//! A background thread samples a shared counter at a fixed interval and hands
//! it to a callback. The thread exits as soon as the tracker is stopped or
//! dropped, and `stop` joins it, so no sampling survives the scan that
//! started it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

pub struct ProgressTracker {
    tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTracker {
    pub fn start<F>(
        interval: Duration,
        current: Arc<AtomicUsize>,
        total: Option<usize>,
        notify: F,
    ) -> Self
    where
        F: Fn(usize, Option<usize>) + Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let spawned = std::thread::Builder::new()
            .name("bva-progress".to_string())
            .spawn(move || run_tracker(rx, interval, current, total, notify));

        match spawned {
            Ok(handle) => Self {
                tx: Some(tx),
                handle: Some(handle),
            },
            Err(e) => {
                tracing::warn!("failed to start progress tracker: {e}");
                Self {
                    tx: None,
                    handle: None,
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tracker<F>(
    rx: Receiver<()>,
    interval: Duration,
    current: Arc<AtomicUsize>,
    total: Option<usize>,
    notify: F,
) where
    F: Fn(usize, Option<usize>),
{
    let interval = interval.max(Duration::from_millis(1));
    loop {
        match rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => notify(current.load(Ordering::Relaxed), total),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
