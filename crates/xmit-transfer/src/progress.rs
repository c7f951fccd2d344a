//! Byte-progress reporting for request bodies.

use std::io::Read;
use std::time::{Duration, Instant};

use tracing::info;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// A reader that logs transfer progress as it is drained.
///
/// Emits at most one line per second of wall clock plus one at end of stream.
/// The output is for humans only and is not part of the wire contract.
pub struct ProgressReader<R> {
    inner: R,
    label: String,
    total: u64,
    read: u64,
    last_report: Instant,
    finished: bool,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, label: impl Into<String>, total: u64) -> Self {
        Self {
            inner,
            label: label.into(),
            total,
            read: 0,
            last_report: Instant::now(),
            finished: false,
        }
    }

    fn report(&mut self) {
        let pct = if self.total == 0 {
            100
        } else {
            self.read * 100 / self.total
        };
        info!("{}: {}/{} bytes ({pct}%)", self.label, self.read, self.total);
        self.last_report = Instant::now();
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if n == 0 {
            if !self.finished {
                self.finished = true;
                self.report();
                info!("{}: sent", self.label);
            }
        } else if self.last_report.elapsed() >= REPORT_INTERVAL {
            self.report();
        }
        Ok(n)
    }
}
