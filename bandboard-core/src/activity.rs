/// Debounced inactivity detection.
///
/// Every recorded board action touches the tracker. Once no touch has arrived
/// for the configured delay the idle callback runs once, then the tracker
/// waits for the next touch.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Cheap handle for reporting activity. Safe to call outside a runtime.
#[derive(Clone, Debug)]
pub struct ActivitySignal {
    tx: mpsc::UnboundedSender<()>,
}

impl ActivitySignal {
    pub fn touch(&self) {
        let _ = self.tx.send(());
    }
}

pub struct ActivityTracker {
    signal: ActivitySignal,
    task: JoinHandle<()>,
}

impl ActivityTracker {
    /// Spawn the tracker on the current tokio runtime.
    pub fn spawn<F>(delay: Duration, on_idle: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, delay, Arc::new(on_idle)));
        Self {
            signal: ActivitySignal { tx },
            task,
        }
    }

    pub fn signal(&self) -> ActivitySignal {
        self.signal.clone()
    }

    pub fn touch(&self) {
        self.signal.touch();
    }
}

impl Drop for ActivityTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<F>(mut rx: mpsc::UnboundedReceiver<()>, delay: Duration, on_idle: Arc<F>)
where
    F: Fn() + Send + Sync + 'static,
{
    while rx.recv().await.is_some() {
        loop {
            match tokio::time::timeout(delay, rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => {
                    log::info!("[bandboard.activity] Idle for {:?}", delay);
                    on_idle();
                    break;
                }
            }
        }
    }
}
