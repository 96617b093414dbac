//! [`Scheduler`] – next-due bookkeeping for the node's periodic tasks.
//!
//! A task is due on the first poll and then once per period. When the loop
//! falls behind, a late task runs once and its next deadline is measured from
//! the late instant; missed periods are not replayed.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTask {
    SensorAcquisition,
    MotorTelemetry,
    SensorTelemetry,
    Heartbeat,
}

#[derive(Debug, Clone)]
struct Entry {
    task: NodeTask,
    period_ms: u64,
    next_due_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or re-period) `task`.
    pub fn every(mut self, task: NodeTask, period_ms: u64) -> Self {
        self.set_period(task, period_ms);
        self
    }

    pub fn set_period(&mut self, task: NodeTask, period_ms: u64) {
        match self.entries.iter_mut().find(|e| e.task == task) {
            Some(entry) => entry.period_ms = period_ms,
            None => self.entries.push(Entry {
                task,
                period_ms,
                next_due_ms: None,
            }),
        }
    }

    pub fn period_ms(&self, task: NodeTask) -> Option<u64> {
        self.entries.iter().find(|e| e.task == task).map(|e| e.period_ms)
    }

    /// Tasks due at `now_ms`, in registration order. Each returned task is
    /// rescheduled one period later.
    pub fn due(&mut self, now_ms: u64) -> Vec<NodeTask> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if entry.next_due_ms.is_none_or(|at| now_ms >= at) {
                entry.next_due_ms = Some(now_ms + entry.period_ms);
                due.push(entry.task);
            }
        }
        due
    }

    /// Earliest upcoming deadline, if every task has run at least once.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries
            .iter()
            .map(|e| e.next_due_ms)
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .min()
    }
}
