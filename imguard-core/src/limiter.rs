//! Bounded-concurrency admission gate.
//!
//! A fixed set of `capacity` long-lived workers pull jobs from a FIFO
//! channel, so at most `capacity` jobs are ever in flight and admission
//! order matches submission order. Completion order is whatever the jobs
//! themselves produce.

use std::{
    any::Any,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use futures::FutureExt;
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use crate::error::LimiterError;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs submitted tasks with at most `capacity` of them in flight.
pub struct Limiter {
    capacity: usize,
    tx: mpsc::UnboundedSender<Job>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl fmt::Debug for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Limiter")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queued())
            .finish()
    }
}

impl Limiter {
    /// Spawn `capacity` workers on the current tokio runtime.
    pub fn new(capacity: usize) -> Result<Self, LimiterError> {
        if capacity == 0 {
            return Err(LimiterError::ZeroCapacity);
        }

        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let active = Arc::new(AtomicUsize::new(0));
        let queued = Arc::new(AtomicUsize::new(0));

        let workers = (0..capacity)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let active = Arc::clone(&active);
                let queued = Arc::clone(&queued);
                tokio::spawn(async move {
                    loop {
                        // Only one idle worker waits on the channel at a
                        // time; the rest queue on the mutex.
                        let job = {
                            let mut guard = rx.lock().await;
                            guard.recv().await
                        };
                        let Some(job) = job else { break };

                        queued.fetch_sub(1, Ordering::AcqRel);
                        active.fetch_add(1, Ordering::AcqRel);
                        job.await;
                        active.fetch_sub(1, Ordering::AcqRel);
                    }
                    trace!(worker, "limiter worker exiting");
                })
            })
            .collect();

        debug!(capacity, "limiter started");

        Ok(Self {
            capacity,
            tx,
            active,
            queued,
            workers,
        })
    }

    /// Maximum jobs in flight.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently running.
    pub fn in_flight(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Jobs submitted but not yet admitted.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Queue `task` for execution. The task runs exactly once; its result
    /// (or panic) is delivered only through the returned handle.
    ///
    /// Dropping the handle does not cancel the task.
    pub fn submit<F, Fut, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = AssertUnwindSafe(async move { task().await })
                .catch_unwind()
                .await
                .map_err(panic_message);
            if let Err(message) = &result {
                warn!(%message, "limiter task panicked");
            }
            // Receiver may be gone; the work still happened.
            let _ = done_tx.send(result);
        });

        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return TaskHandle { rx: None };
        }

        TaskHandle { rx: Some(done_rx) }
    }

    /// Stop accepting work, let queued jobs drain, and join the workers.
    pub async fn shutdown(self) {
        let Self { tx, workers, .. } = self;
        drop(tx);
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "limiter worker did not exit cleanly");
            }
        }
    }
}

/// Completion handle returned by [`Limiter::submit`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Option<oneshot::Receiver<Result<T, String>>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, LimiterError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(LimiterError::Closed));
        };

        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(message))) => {
                Poll::Ready(Err(LimiterError::TaskPanicked(message)))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(LimiterError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Mutex as StdMutex, time::Duration};

    #[tokio::test]
    async fn zero_capacity_is_rejected() {
        assert_eq!(Limiter::new(0).unwrap_err(), LimiterError::ZeroCapacity);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_capacity() {
        let limiter = Limiter::new(3).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..24)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                limiter.submit(move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "observed {peak} concurrent tasks");
        assert!(peak >= 1);
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn admits_in_submission_order() {
        let limiter = Limiter::new(1).unwrap();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let handles: Vec<_> = (0..50)
            .map(|idx| {
                let order = Arc::clone(&order);
                limiter.submit(move || async move {
                    order.lock().unwrap().push(idx);
                })
            })
            .collect();
        futures::future::join_all(handles).await;

        let order = order.lock().unwrap().clone();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failures_and_panics_stay_with_their_caller() {
        let limiter = Limiter::new(2).unwrap();

        let ok = limiter.submit(|| async { Ok::<u32, String>(7) });
        let failed =
            limiter.submit(|| async { Err::<u32, String>("nope".into()) });
        let panicked = limiter.submit(|| async {
            if true {
                panic!("boom");
            }
            0u32
        });
        let after = limiter.submit(|| async { 11u32 });

        assert_eq!(ok.await.unwrap(), Ok(7));
        assert_eq!(failed.await.unwrap(), Err("nope".to_string()));
        assert_eq!(
            panicked.await.unwrap_err(),
            LimiterError::TaskPanicked("boom".into())
        );
        // The worker that caught the panic keeps serving.
        assert_eq!(after.await.unwrap(), 11);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_work() {
        let limiter = Limiter::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = Arc::clone(&done);
            // Handles dropped on purpose: the work must still run.
            drop(limiter.submit(move || async move {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        limiter.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }
}
