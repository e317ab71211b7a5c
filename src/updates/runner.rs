//! Update loop.
//!
//! The loop follows a simple shape:
//! 1. A pump task pulls messages from the source into a channel
//! 2. Every message is handled in its own task, so one slow or failing
//!    update never blocks the others
//! 3. A handler error or panic is logged and reported back to the handler,
//!    which answers the user with a generic error
//! 4. A timer runs the handler's housekeeping

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::{UpdateHandler, UpdateSource};
use crate::telegram::IncomingMessage;

/// Buffered updates between the pump and the loop.
const PUMP_CAPACITY: usize = 64;

/// Messages that can be sent to the runner.
#[derive(Debug, Clone)]
pub enum RunnerMessage {
    /// Stop the runner.
    Shutdown,
}

/// Drives a handler with updates from a source.
pub struct UpdateRunner<S, H> {
    source: Arc<S>,
    handler: Arc<H>,
    sweep_interval: Duration,
}

impl<S, H> UpdateRunner<S, H>
where
    S: UpdateSource + 'static,
    H: UpdateHandler,
{
    /// Creates a new update runner.
    #[must_use]
    pub fn new(source: Arc<S>, handler: Arc<H>) -> Self {
        Self {
            source,
            handler,
            sweep_interval: Duration::from_secs(60),
        }
    }

    /// Sets how often the handler's housekeeping runs.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Runs until shutdown or until the source ends, then waits for the
    /// updates still in flight.
    pub async fn run(&self, mut rx: mpsc::Receiver<RunnerMessage>) {
        info!("Update runner started");

        let (tx, mut updates) = mpsc::channel(PUMP_CAPACITY);
        let source = Arc::clone(&self.source);
        let pump = tokio::spawn(async move {
            while let Some(message) = source.next_update().await {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            debug!("Update source ended");
        });

        let mut sweep_timer = interval(self.sweep_interval);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                update = updates.recv() => {
                    match update {
                        Some(message) => self.dispatch(&mut tasks, message),
                        None => {
                            info!("Update stream closed");
                            break;
                        }
                    }
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        error!("Update task failed to complete: {}", e);
                    }
                }
                _ = sweep_timer.tick() => {
                    self.handler.sweep().await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(RunnerMessage::Shutdown) | None => {
                            info!("Update runner shutting down");
                            break;
                        }
                    }
                }
            }
        }

        pump.abort();
        let pending = tasks.len();
        if pending > 0 {
            debug!("Waiting for {} in-flight updates", pending);
        }
        while tasks.join_next().await.is_some() {}
        info!("Update runner stopped");
    }

    /// Handles one update in a task of its own. The inner spawn turns a
    /// panic into a `JoinError` the outer task can report.
    fn dispatch(&self, tasks: &mut JoinSet<()>, message: IncomingMessage) {
        let handler = Arc::clone(&self.handler);

        tasks.spawn(async move {
            let inner = Arc::clone(&handler);
            let update = message.clone();
            let result = tokio::spawn(async move { inner.handle(update).await }).await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Failed to handle update from {}: {}", message.sender, e);
                    handler.on_failure(&message).await;
                }
                Err(e) => {
                    error!("Update handler panicked for {}: {}", message.sender, e);
                    handler.on_failure(&message).await;
                }
            }
        });
    }
}

impl<S, H> std::fmt::Debug for UpdateRunner<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateRunner")
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;

    struct ScriptedSource {
        messages: Mutex<VecDeque<IncomingMessage>>,
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn next_update(&self) -> Option<IncomingMessage> {
            self.messages.lock().await.pop_front()
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        handled: AtomicUsize,
        failures: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateHandler for CountingHandler {
        type Error = String;

        async fn handle(&self, message: IncomingMessage) -> Result<(), String> {
            match message.text.as_str() {
                "fail" => Err("bad input".to_owned()),
                "panic" => panic!("handler bug"),
                _ => {
                    self.handled.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }

        async fn on_failure(&self, message: &IncomingMessage) {
            self.failures.lock().await.push(message.sender);
        }
    }

    fn message(sender: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            chat: sender,
            sender,
            text: text.to_owned(),
            media: None,
        }
    }

    #[tokio::test]
    async fn test_errors_and_panics_are_contained() {
        let source = Arc::new(ScriptedSource {
            messages: Mutex::new(VecDeque::from([
                message(1, "hello"),
                message(2, "fail"),
                message(3, "panic"),
                message(4, "again"),
            ])),
        });
        let handler = Arc::new(CountingHandler::default());
        let (_tx, rx) = mpsc::channel(1);

        UpdateRunner::new(source, Arc::clone(&handler)).run(rx).await;

        assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
        let mut failures = handler.failures.lock().await.clone();
        failures.sort_unstable();
        assert_eq!(failures, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_runner() {
        struct Endless;

        #[async_trait]
        impl UpdateSource for Endless {
            async fn next_update(&self) -> Option<IncomingMessage> {
                std::future::pending().await
            }
        }

        let handler = Arc::new(CountingHandler::default());
        let (tx, rx) = mpsc::channel(1);
        tx.send(RunnerMessage::Shutdown).await.unwrap();

        UpdateRunner::new(Arc::new(Endless), handler).run(rx).await;
    }
}
