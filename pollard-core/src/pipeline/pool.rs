//! Bounded worker pool shared by the fetch and synthesis stages.
//!
//! Each stage owns its own pool, so network fetches and agent processes never
//! compete for the same slots. One task is spawned per input; a task waits for
//! a slot from a fixed-capacity semaphore before doing any work. Results are
//! collected by awaiting the join handles in dispatch order, so output `i`
//! always belongs to input `i` regardless of completion order.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a task did not produce its own result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interruption {
    /// The batch was cancelled before a worker slot became free.
    Cancelled,
    /// The task panicked.
    Panicked(String),
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::Cancelled => f.write_str("context cancelled"),
            Interruption::Panicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

/// A fixed number of concurrent execution slots.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: &'static str,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool. A capacity of zero is treated as one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run `work` over every input with at most `capacity` tasks in flight.
    ///
    /// Inputs are shared with their tasks rather than copied, so the batch is
    /// held in memory once. Inputs still waiting for a slot when `cancel`
    /// fires resolve through `interrupted` without running. Tasks already
    /// running are not aborted; `work` is expected to observe `cancel` itself
    /// where that matters.
    pub async fn run<I, O, W, Fut, A>(
        &self,
        inputs: Vec<I>,
        cancel: &CancellationToken,
        work: W,
        interrupted: A,
    ) -> Vec<O>
    where
        I: Send + Sync + 'static,
        O: Send + 'static,
        W: Fn(usize, Arc<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
        A: Fn(usize, Arc<I>, Interruption) -> O,
    {
        if inputs.is_empty() {
            return Vec::new();
        }

        debug!(
            pool = self.name,
            tasks = inputs.len(),
            capacity = self.capacity,
            "Dispatching batch"
        );

        let slots = Arc::new(Semaphore::new(self.capacity));
        let work = Arc::new(work);
        let inputs: Vec<Arc<I>> = inputs.into_iter().map(Arc::new).collect();
        let mut handles = Vec::with_capacity(inputs.len());

        for (idx, input) in inputs.iter().enumerate() {
            let input = Arc::clone(input);
            let slots = Arc::clone(&slots);
            let work = Arc::clone(&work);
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Interruption::Cancelled),
                    permit = slots.acquire_owned() => permit,
                };
                // The semaphore is never closed; treat a closed one like cancellation.
                let Ok(_permit) = permit else {
                    return Err(Interruption::Cancelled);
                };
                Ok(work(idx, input).await)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (idx, (handle, input)) in handles.into_iter().zip(inputs).enumerate() {
            let output = match handle.await {
                Ok(Ok(output)) => output,
                Ok(Err(reason)) => {
                    debug!(pool = self.name, index = idx, %reason, "Task interrupted");
                    interrupted(idx, input, reason)
                }
                Err(e) => {
                    warn!(pool = self.name, index = idx, error = %e, "Worker task failed");
                    interrupted(idx, input, Interruption::Panicked(e.to_string()))
                }
            };
            results.push(output);
        }
        results
    }
}
