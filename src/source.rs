//! Candidate providers and batch sinks.
//!
//! The scheduler pulls batches through [`CandidateSource`] and pushes
//! completed batches through [`HashSink`]. Both are generic parameters
//! at the scheduler boundary so the hot loop monomorphizes; nothing in
//! the core dispatches dynamically per record.

use crate::candidate::Candidate;
use crate::input::InputFile;
use crate::pattern::Pattern;

/// Pull interface filling a batch of candidate records.
pub trait CandidateSource {
    /// Fill up to `out.len()` records from the front of `out`, returning
    /// how many were written. Returning 0 signals end of stream.
    fn fill(&mut self, out: &mut [Candidate]) -> usize;
}

/// Push interface consuming one completed batch.
pub trait HashSink {
    fn consume(&mut self, batch: &[Candidate]);
}

/// Provider over a fixed list of candidate lines.
#[derive(Debug, Clone)]
pub struct LineSource {
    lines: Vec<String>,
    next: usize,
}

impl LineSource {
    pub fn new(lines: Vec<String>) -> Self {
        LineSource { lines, next: 0 }
    }

    pub fn from_file(file: InputFile) -> Self {
        Self::new(file.into_lines())
    }

    /// Candidates not yet handed out.
    pub fn remaining(&self) -> usize {
        self.lines.len() - self.next
    }
}

impl CandidateSource for LineSource {
    fn fill(&mut self, out: &mut [Candidate]) -> usize {
        let mut written = 0;
        while written < out.len() && self.next < self.lines.len() {
            out[written].set_text(self.lines[self.next].as_bytes());
            self.next += 1;
            written += 1;
        }
        written
    }
}

/// Provider enumerating a pattern expression.
#[derive(Debug, Clone)]
pub struct PatternSource {
    pattern: Pattern,
}

impl PatternSource {
    pub fn new(pattern: Pattern) -> Self {
        PatternSource { pattern }
    }

    pub fn remaining(&self) -> bool {
        self.pattern.has_next()
    }
}

impl CandidateSource for PatternSource {
    fn fill(&mut self, out: &mut [Candidate]) -> usize {
        let mut written = 0;
        while written < out.len() && self.pattern.write(&mut out[written]) {
            written += 1;
        }
        written
    }
}

/// Sink retaining everything it sees; for tests and small runs.
#[derive(Debug, Default)]
pub struct CollectSink {
    /// Candidate text and hash, in delivery order.
    pub entries: Vec<(String, u32)>,
    /// Size of each delivered batch, in delivery order.
    pub batches: Vec<usize>,
}

impl HashSink for CollectSink {
    fn consume(&mut self, batch: &[Candidate]) {
        self.batches.push(batch.len());
        for c in batch {
            self.entries.push((c.text_string(), c.hash));
        }
    }
}

/// Sink that drops its batches; for pure throughput runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl HashSink for NullSink {
    fn consume(&mut self, _batch: &[Candidate]) {}
}
