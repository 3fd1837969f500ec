//! Fixed-size worker pool over a single shared delivery channel.
//!
//! The supervisor forwards deliveries from the upstream stream into a bounded
//! channel read by every worker. On shutdown it stops pulling new deliveries,
//! closes the channel and waits for every worker to settle what it holds.

use crate::models::{Disposition, ProcessingOutcome};
use crate::pipeline::JobHandler;
use crate::queue::BoxDelivery;
use crate::Error;
use futures::{FutureExt, Stream, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type SharedReceiver = Arc<Mutex<mpsc::Receiver<BoxDelivery>>>;

/// Totals reported once the pool has fully drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Deliveries handed to a worker.
    pub dispatched: usize,
    /// Worker tasks that ended abnormally.
    pub failed_workers: usize,
}

pub struct WorkerPool {
    handler: Arc<dyn JobHandler>,
    size: usize,
}

impl WorkerPool {
    pub fn new(handler: Arc<dyn JobHandler>, size: usize) -> Self {
        Self {
            handler,
            size: size.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Consumes `deliveries` until the stream ends or `shutdown` fires, then
    /// waits for every worker to exit.
    pub async fn run<S>(&self, mut deliveries: S, shutdown: CancellationToken) -> DrainSummary
    where
        S: Stream<Item = BoxDelivery> + Unpin + Send,
    {
        let (sender, receiver) = mpsc::channel::<BoxDelivery>(self.size);
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for id in 0..self.size {
            workers.spawn(worker_loop(id, receiver.clone(), self.handler.clone()));
        }
        info!(" [*] {} workers waiting for messages", self.size);

        let mut summary = DrainSummary::default();
        loop {
            let delivery = tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting deliveries");
                    break;
                }

                next = deliveries.next() => match next {
                    Some(delivery) => delivery,
                    None => {
                        info!("Delivery stream closed");
                        break;
                    }
                },
            };

            // Not raced against shutdown: once pulled, a delivery must reach a
            // worker or be settled here.
            if let Err(mpsc::error::SendError(delivery)) = sender.send(delivery).await {
                warn!("No workers left, requeueing delivery");
                if let Err(e) = delivery.settle(Disposition::Requeue).await {
                    error!("Failed to requeue delivery: {}", e);
                }
                break;
            }
            summary.dispatched += 1;
        }

        drop(sender);
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
                summary.failed_workers += 1;
            }
        }

        info!(
            "All workers drained ({} deliveries dispatched)",
            summary.dispatched
        );
        summary
    }
}

async fn worker_loop(id: usize, receiver: SharedReceiver, handler: Arc<dyn JobHandler>) {
    debug!(worker = id, "Worker started");

    loop {
        trace!(worker = id, "Receiving");
        let next = receiver.lock().await.recv().await;
        let Some(delivery) = next else {
            break;
        };

        trace!(worker = id, "Processing");
        let outcome = run_guarded(handler.as_ref(), delivery.body()).await;
        let disposition = outcome.disposition();

        trace!(worker = id, %disposition, "Disposing");
        if let Err(e) = delivery.settle(disposition).await {
            error!(worker = id, "Failed to settle delivery ({}): {}", disposition, e);
        }
    }

    debug!(worker = id, "Worker stopped");
}

/// Runs the handler, turning a panic into a permanent failure so a poison
/// message is discarded instead of taking the worker down.
async fn run_guarded(handler: &dyn JobHandler, body: &[u8]) -> ProcessingOutcome {
    match AssertUnwindSafe(handler.handle(body)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Job handler panicked: {}", message);
            handler
                .report_fault(&format!("worker panicked while processing job: {}", message))
                .await;
            ProcessingOutcome::PermanentFailure(Error::Invariant(format!(
                "handler panicked: {}",
                message
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::DispositionLog;
    use async_trait::async_trait;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedHandler {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        faults: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedHandler {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, body: &[u8]) -> ProcessingOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match body {
                b"skip" => ProcessingOutcome::Skip,
                b"retry" => ProcessingOutcome::TransientFailure(Error::Read("busy".into())),
                b"poison" => {
                    ProcessingOutcome::PermanentFailure(Error::UnsupportedFormat("text".into()))
                }
                b"panic" => panic!("handler exploded"),
                _ => ProcessingOutcome::Success,
            }
        }

        async fn report_fault(&self, message: &str) {
            self.faults.lock().unwrap().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn test_outcomes_map_to_dispositions() {
        let log = DispositionLog::new();
        let bodies = ["ok", "skip", "retry", "poison"];
        let deliveries: Vec<BoxDelivery> = bodies
            .iter()
            .enumerate()
            .map(|(i, body)| log.delivery(i as u64, *body))
            .collect();

        let pool = WorkerPool::new(Arc::new(ScriptedHandler::default()), 2);
        let summary = pool
            .run(stream::iter(deliveries), CancellationToken::new())
            .await;

        assert_eq!(summary.dispatched, 4);
        assert_eq!(log.dispositions_of(0), vec![Disposition::Ack]);
        assert_eq!(log.dispositions_of(1), vec![Disposition::Ack]);
        assert_eq!(log.dispositions_of(2), vec![Disposition::Requeue]);
        assert_eq!(log.dispositions_of(3), vec![Disposition::Discard]);
    }

    #[tokio::test]
    async fn test_panic_is_contained_to_one_delivery() {
        let log = DispositionLog::new();
        let deliveries = vec![
            log.delivery(0, "panic"),
            log.delivery(1, "ok"),
            log.delivery(2, "ok"),
        ];
        let handler = Arc::new(ScriptedHandler::default());

        let pool = WorkerPool::new(handler.clone(), 1);
        let summary = pool
            .run(stream::iter(deliveries), CancellationToken::new())
            .await;

        assert_eq!(summary.failed_workers, 0);
        assert_eq!(log.dispositions_of(0), vec![Disposition::Discard]);
        assert_eq!(log.dispositions_of(1), vec![Disposition::Ack]);
        assert_eq!(log.dispositions_of(2), vec![Disposition::Ack]);

        let faults = handler.faults.lock().unwrap().clone();
        assert_eq!(faults.len(), 1);
        assert!(faults[0].contains("handler exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded_by_pool_size() {
        let log = DispositionLog::new();
        let deliveries: Vec<BoxDelivery> = (0..9).map(|i| log.delivery(i, "ok")).collect();
        let handler = Arc::new(ScriptedHandler::with_delay(Duration::from_millis(100)));

        let pool = WorkerPool::new(handler.clone(), 3);
        pool.run(stream::iter(deliveries), CancellationToken::new())
            .await;

        assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(log.settled().len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_in_flight_deliveries() {
        let log = DispositionLog::new();
        let yielded = Arc::new(AtomicUsize::new(0));
        let counter = yielded.clone();
        let deliveries: Vec<BoxDelivery> = (0..6).map(|i| log.delivery(i, "ok")).collect();
        // Upstream stays open until shutdown, like a live queue consumer.
        let upstream = stream::iter(deliveries)
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .chain(stream::pending());

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let handler = Arc::new(ScriptedHandler::with_delay(Duration::from_millis(50)));
        let pool = WorkerPool::new(handler.clone(), 2);
        let summary = pool.run(upstream, shutdown).await;

        let settled = log.settled();
        assert!(summary.dispatched > 0);
        assert_eq!(summary.dispatched, yielded.load(Ordering::SeqCst));
        assert_eq!(settled.len(), summary.dispatched);
        for delivery in &settled {
            assert_eq!(log.dispositions_of(delivery.id).len(), 1);
        }
        assert_eq!(handler.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_with_idle_upstream_returns() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let pool = WorkerPool::new(Arc::new(ScriptedHandler::default()), 3);
        let summary = pool
            .run(stream::pending::<BoxDelivery>(), shutdown)
            .await;

        assert_eq!(summary, DrainSummary::default());
    }

    #[test]
    fn test_zero_sized_pool_still_has_a_worker() {
        let pool = WorkerPool::new(Arc::new(ScriptedHandler::default()), 0);
        assert_eq!(pool.size(), 1);
    }
}
