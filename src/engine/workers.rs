use std::collections::HashMap;

/// Per-process count of workers currently processing a request, derived from
/// start/completion events in log order.
///
/// Counts are approximate: workers already busy when the log begins are never
/// seen starting, so early snapshots may undercount.
#[derive(Debug, Default, Clone)]
pub struct WorkerTracker {
    busy: HashMap<u32, u32>,
}

impl WorkerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(&mut self, pid: u32) {
        *self.busy.entry(pid).or_insert(0) += 1;
    }

    /// Floored at zero: a completion whose start predates the log is ignored.
    pub fn on_end(&mut self, pid: u32) {
        let count = self.busy.entry(pid).or_insert(0);
        *count = count.saturating_sub(1);
    }

    pub fn snapshot(&self, pid: u32) -> u32 {
        self.busy.get(&pid).copied().unwrap_or(0)
    }

    /// Processes seen so far and their current counts, ordered by pid.
    pub fn processes(&self) -> Vec<(u32, u32)> {
        let mut all: Vec<(u32, u32)> = self.busy.iter().map(|(p, c)| (*p, *c)).collect();
        all.sort_unstable();
        all
    }
}
