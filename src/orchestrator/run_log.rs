use crate::types::LogLine;
use std::collections::VecDeque;

/// Bounded run log; the oldest lines are dropped once `capacity` is reached
#[derive(Debug)]
pub(crate) struct RunLog {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

impl RunLog {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, line: LogLine) {
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Remove and return every buffered line, oldest first
    pub(crate) fn drain(&mut self) -> Vec<LogLine> {
        self.lines.drain(..).collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }
}
