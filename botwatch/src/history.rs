//! Bounded, arrival-ordered buffers for operator log lines.

use std::collections::VecDeque;

use crate::reconcile::MAX_LOG_LINES;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while dq.len() >= cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

// FIFO eviction: reads never reorder entries.
#[derive(Debug, Clone)]
pub struct LogCache {
    lines: VecDeque<String>,
    cap: usize,
    appended: u64,
}

impl LogCache {
    pub fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap),
            cap,
            appended: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        push_capped(&mut self.lines, line, self.cap);
        self.appended += 1;
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        for line in lines {
            self.push(line);
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Total lines ever pushed, including evicted ones.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Lines pushed after the reader had seen `seen` in total. Lines evicted
    /// in the meantime are gone.
    pub fn since(&self, seen: u64) -> Vec<String> {
        let fresh = self.appended.saturating_sub(seen);
        let n = usize::try_from(fresh).unwrap_or(usize::MAX);
        self.tail(n)
    }

    /// The latest `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }
}

impl Default for LogCache {
    fn default() -> Self {
        Self::new(MAX_LOG_LINES)
    }
}
