//! Sequential reader over the raw bytes of every segment store.

use crate::segment::Segment;
use std::io;
use std::sync::Arc;

/// Reads the concatenated store bytes of a snapshot of segments.
///
/// The output is the exact store format: length-prefixed records back to
/// back, segment after segment. Obtained from [`crate::Log::reader`].
pub struct LogReader {
    segments: Vec<Arc<Segment>>,
    current: usize,
    position: u64,
}

impl LogReader {
    pub(crate) fn new(segments: Vec<Arc<Segment>>) -> Self {
        Self {
            segments,
            current: 0,
            position: 0,
        }
    }
}

impl io::Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while let Some(segment) = self.segments.get(self.current) {
            let n = segment
                .store()
                .read_at(buf, self.position)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }
            self.current += 1;
            self.position = 0;
        }

        Ok(0)
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("segments", &self.segments.len())
            .field("current", &self.current)
            .field("position", &self.position)
            .finish()
    }
}
