//! Asynchronous GPU timer queries
//!
//! Queries are started around a filter's draw or a whole frame and polled on
//! later frames; nothing ever waits for a result. Only one query runs at a
//! time: starting a new one ends the running one first.

use crate::backend::{QueryId, QueryStatus, RenderBackend};
use crate::filter::FilterRef;

pub const DEFAULT_MAX_PENDING_QUERIES: usize = 30;

/// What a measurement is delivered to
#[derive(Clone, Debug, PartialEq)]
pub enum TimerTarget {
    Filter(FilterRef),
    Frame,
}

#[derive(Debug)]
struct PendingQuery {
    query: QueryId,
    target: TimerTarget,
    ended: bool,
}

/// Counters for the timer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub started: u64,
    pub delivered: u64,
    /// Dropped past the pending cap or invalidated by the driver
    pub dropped: u64,
    pub pending: usize,
}

#[derive(Debug)]
pub struct GpuTimer {
    pending: Vec<PendingQuery>,
    max_pending: usize,
    started: u64,
    delivered: u64,
    dropped: u64,
}

impl Default for GpuTimer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_QUERIES)
    }
}

impl GpuTimer {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
            started: 0,
            delivered: 0,
            dropped: 0,
        }
    }

    pub fn set_max_pending(&mut self, max_pending: usize) {
        self.max_pending = max_pending;
    }

    /// Begin measuring; a no-op when the backend has no timer queries
    pub fn start(&mut self, backend: &mut dyn RenderBackend, target: TimerTarget) {
        if self.pending.last().is_some_and(|q| !q.ended) {
            self.end_running(backend);
        }
        let Some(query) = backend.begin_timer_query() else {
            return;
        };
        self.started += 1;
        self.pending.push(PendingQuery {
            query,
            target,
            ended: false,
        });
    }

    /// End the running query and deliver any results that became available.
    /// Returns the frame measurements, in milliseconds, that resolved.
    pub fn stop(&mut self, backend: &mut dyn RenderBackend) -> Vec<f64> {
        self.end_running(backend);
        self.process(backend)
    }

    fn end_running(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(last) = self.pending.last_mut() {
            if !last.ended {
                last.ended = true;
                backend.end_timer_query(last.query);
            }
        }
    }

    /// Poll every pending query. Filter results go straight to
    /// [`Filter::benchmark_result`](crate::filter::Filter::benchmark_result);
    /// frame results are returned.
    pub fn process(&mut self, backend: &mut dyn RenderBackend) -> Vec<f64> {
        let mut frames = Vec::new();
        let mut index = 0;
        while index < self.pending.len() {
            let status = if self.pending[index].ended {
                backend.timer_query_status(self.pending[index].query)
            } else {
                QueryStatus::Pending
            };

            match status {
                QueryStatus::Pending => {
                    if self.pending.len() > self.max_pending {
                        let dropped = self.pending.remove(index);
                        backend.delete_timer_query(dropped.query);
                        self.dropped += 1;
                    } else {
                        index += 1;
                    }
                }
                QueryStatus::Disjoint => {
                    let dropped = self.pending.remove(index);
                    backend.delete_timer_query(dropped.query);
                    self.dropped += 1;
                }
                QueryStatus::Ready(nanoseconds) => {
                    let done = self.pending.remove(index);
                    backend.delete_timer_query(done.query);
                    let milliseconds = nanoseconds as f64 / 1_000_000.0;
                    self.delivered += 1;
                    match done.target {
                        TimerTarget::Filter(filter) => {
                            filter.borrow_mut().benchmark_result(milliseconds);
                        }
                        TimerTarget::Frame => frames.push(milliseconds),
                    }
                }
            }
        }
        frames
    }

    /// Forget pending queries without touching the device, after context loss
    pub fn forget(&mut self) {
        self.pending.clear();
    }

    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for pending in self.pending.drain(..) {
            backend.delete_timer_query(pending.query);
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> TimerStats {
        TimerStats {
            started: self.started,
            delivered: self.delivered,
            dropped: self.dropped,
            pending: self.pending.len(),
        }
    }
}
