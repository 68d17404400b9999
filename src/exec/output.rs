// src/exec/output.rs

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Lines kept per worker when no limit is given.
pub const DEFAULT_TAIL_LINES: usize = 40;

/// Bounded, shared buffer of the most recent output lines of a process.
///
/// Cloning shares the buffer; reader tasks push, the registry reads.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).is_empty()
    }

    /// Buffered lines joined with `\n`, oldest first.
    pub fn snapshot(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Consume `stream` line by line on a background task.
    ///
    /// Draining also keeps the pipe from filling up and blocking the child.
    pub fn drain<R>(&self, stream: R, worker: String, stream_name: &'static str)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(worker = %worker, "{stream_name}: {line}");
                tail.push(format!("[{stream_name}] {line}"));
            }
            debug!(worker = %worker, stream = stream_name, "output stream closed");
        });
    }
}
