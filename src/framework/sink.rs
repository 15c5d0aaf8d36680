use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::warn;

use crate::framework::{FrameworkError, TicketId};

/// Byte span written for one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpan {
    /// Claim index within the worker.
    pub segment: usize,
    /// Offset of the first byte.
    pub offset: u64,
    /// Bytes written.
    pub len: u64,
}

/// Worker-owned output that remembers which bytes belong to which claim.
#[derive(Debug)]
pub struct SegmentedSink<W> {
    inner: W,
    written: u64,
    open: Option<(usize, u64)>,
    spans: Vec<SegmentSpan>,
}

impl<W: Write> SegmentedSink<W> {
    /// Wrap an empty writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            written: 0,
            open: None,
            spans: Vec::new(),
        }
    }

    /// Start collecting bytes for `segment`, closing any open segment.
    pub fn begin_segment(&mut self, segment: usize) {
        self.end_segment();
        self.open = Some((segment, self.written));
    }

    /// Close the open segment and return its span.
    pub fn end_segment(&mut self) -> Option<SegmentSpan> {
        let (segment, offset) = self.open.take()?;
        let span = SegmentSpan {
            segment,
            offset,
            len: self.written - offset,
        };
        self.spans.push(span);
        Some(span)
    }

    /// Close any open segment, flush, and hand back the writer.
    pub fn finish(mut self) -> io::Result<FinishedSink<W>> {
        self.end_segment();
        self.inner.flush()?;
        Ok(FinishedSink {
            inner: self.inner,
            spans: self.spans,
        })
    }
}

impl<W: Write> Write for SegmentedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Flushed worker output with its segment spans.
#[derive(Debug)]
pub struct FinishedSink<W> {
    /// Underlying writer.
    pub inner: W,
    /// Spans in the order segments were written.
    pub spans: Vec<SegmentSpan>,
}

impl<W> FinishedSink<W> {
    fn span(&self, segment: usize) -> Option<SegmentSpan> {
        self.spans.iter().find(|span| span.segment == segment).copied()
    }
}

/// Concatenate worker outputs into `out` following `order`.
///
/// `sinks` is indexed by worker id; `None` marks a worker whose output was
/// lost. Claims without output are skipped with a warning. Returns the number
/// of bytes copied.
pub fn merge_outputs<R, W>(
    order: &[TicketId],
    sinks: &mut [Option<FinishedSink<R>>],
    out: &mut W,
) -> Result<u64, FrameworkError>
where
    R: Read + Seek,
    W: Write + ?Sized,
{
    let mut copied = 0;
    for id in order {
        let Some(sink) = sinks.get_mut(id.worker_id).and_then(Option::as_mut) else {
            warn!(worker = id.worker_id, segment = id.segment, "no output for claim");
            continue;
        };
        let Some(span) = sink.span(id.segment) else {
            warn!(worker = id.worker_id, segment = id.segment, "claim produced no segment");
            continue;
        };
        sink.inner.seek(SeekFrom::Start(span.offset))?;
        let n = io::copy(&mut (&mut sink.inner).take(span.len), out)?;
        if n != span.len {
            return Err(FrameworkError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "worker {} segment {}: expected {} bytes, read {n}",
                    id.worker_id, id.segment, span.len
                ),
            )));
        }
        copied += n;
    }
    out.flush()?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sink_with(segments: &[(usize, &str)]) -> FinishedSink<Cursor<Vec<u8>>> {
        let mut sink = SegmentedSink::new(Cursor::new(Vec::new()));
        for &(segment, text) in segments {
            sink.begin_segment(segment);
            sink.write_all(text.as_bytes()).unwrap();
        }
        sink.finish().unwrap()
    }

    #[test]
    fn spans_track_segments() {
        let sink = sink_with(&[(0, "ab"), (1, ""), (2, "cde")]);
        assert_eq!(
            sink.spans,
            vec![
                SegmentSpan { segment: 0, offset: 0, len: 2 },
                SegmentSpan { segment: 1, offset: 2, len: 0 },
                SegmentSpan { segment: 2, offset: 2, len: 3 },
            ]
        );
    }

    #[test]
    fn merge_interleaves_workers_by_claim_order() {
        let mut sinks = vec![
            Some(sink_with(&[(0, "r1\n"), (1, "r3\n")])),
            Some(sink_with(&[(0, "r2\n")])),
        ];
        let order = [
            TicketId { worker_id: 0, segment: 0 },
            TicketId { worker_id: 1, segment: 0 },
            TicketId { worker_id: 0, segment: 1 },
        ];
        let mut out = Vec::new();
        let copied = merge_outputs(&order, &mut sinks, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "r1\nr2\nr3\n");
        assert_eq!(copied, 9);
    }

    #[test]
    fn merge_skips_lost_workers() {
        let mut sinks = vec![Some(sink_with(&[(0, "kept\n")])), None];
        let order = [
            TicketId { worker_id: 1, segment: 0 },
            TicketId { worker_id: 0, segment: 0 },
        ];
        let mut out = Vec::new();
        merge_outputs(&order, &mut sinks, &mut out).unwrap();
        assert_eq!(out, b"kept\n");
    }
}
