//! Background job queue feeding results back to the authority thread.
//!
//! Jobs run on the rayon pool; each finished job pushes its result into a
//! single-consumer channel that the owner drains once per tick. The queue does
//! no validation itself: consumers must check that the request a result
//! answers is still current before applying it.

use tokio::sync::mpsc;

pub struct JobQueue<R: Send + 'static> {
    result_tx: mpsc::UnboundedSender<R>,
    result_rx: mpsc::UnboundedReceiver<R>,
    in_flight: usize,
}

impl<R: Send + 'static> JobQueue<R> {
    pub fn new() -> Self {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        Self {
            result_tx,
            result_rx,
            in_flight: 0,
        }
    }

    /// Run `job` on a worker thread.
    pub fn submit<F>(&mut self, job: F)
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let tx = self.result_tx.clone();
        self.in_flight += 1;
        rayon::spawn(move || {
            // Receiver gone means the owner was dropped; nothing to report to.
            let _ = tx.send(job());
        });
    }

    /// Collect every result that is ready (non-blocking).
    pub fn drain(&mut self) -> Vec<R> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            results.push(result);
        }
        self.in_flight = self.in_flight.saturating_sub(results.len());
        results
    }

    /// Block until one result arrives. Returns `None` if nothing is in flight.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_one(&mut self) -> Option<R> {
        if self.in_flight == 0 {
            return None;
        }
        let result = self.result_rx.blocking_recv();
        if result.is_some() {
            self.in_flight -= 1;
        }
        result
    }

    /// Number of submitted jobs whose results have not been drained yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl<R: Send + 'static> Default for JobQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}
