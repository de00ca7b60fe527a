//! Frame scheduling: prime, steady-state rotation, drain.
//!
//! A single host thread drives the ring. Priming fills and submits
//! every slot; the steady state then revisits slots in submission
//! order, so each wait lands on the oldest in-flight batch: read its
//! output, refill it, submit it again. When the provider runs dry the
//! remaining in-flight slots are drained in the same order. The result
//! is at most `depth` batches in flight and sink calls in exact
//! submission order.

use crate::candidate::Candidate;
use crate::gpu::frames::FrameRing;
use crate::gpu::GpuEngine;
use crate::lookup3;
use crate::metrics::Metrics;
use crate::source::{CandidateSource, HashSink};
use crate::JhResult;

/// Offender strings kept for the validation report.
const MAX_MISMATCH_REPORTS: usize = 64;

/// Totals and validation results for one run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Candidates handed to the hashing stage.
    pub submitted: u64,
    /// Candidates delivered to the sink.
    pub delivered: u64,
    /// CPU/GPU disagreements seen in validation mode.
    pub mismatch_count: u64,
    /// Offending candidate strings, capped at [`MAX_MISMATCH_REPORTS`].
    pub mismatches: Vec<String>,
}

/// Drives candidate batches through the GPU frame ring.
pub struct Scheduler<'e> {
    engine: &'e GpuEngine,
    ring: FrameRing,
    validate: bool,
}

impl<'e> Scheduler<'e> {
    /// Allocate `frame_count` frames on `engine`.
    pub fn new(engine: &'e GpuEngine, frame_count: u32) -> JhResult<Self> {
        Ok(Scheduler {
            engine,
            ring: engine.create_frames(frame_count)?,
            validate: false,
        })
    }

    /// Re-hash every delivered batch on the CPU and collect mismatches.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Pump the provider dry through the frame ring.
    ///
    /// The sink sees every provided candidate exactly once, in provider
    /// order, with its `hash` field filled in by the device.
    pub fn run<P, S>(&mut self, source: &mut P, sink: &mut S, metrics: &Metrics) -> JhResult<RunStats>
    where
        P: CandidateSource,
        S: HashSink,
    {
        let engine = self.engine;
        let validate = self.validate;
        let depth = self.ring.depth();
        let mut stats = RunStats::default();

        // Prime: fill and submit until every slot is in flight, or the
        // provider runs out early.
        let mut primed = 0;
        for _ in 0..depth {
            let idx = self.ring.acquire();
            let count = engine.stage_input(self.ring.slot_mut(idx), source)?;
            if count == 0 {
                break;
            }
            metrics.increment(count as u64);
            stats.submitted += count as u64;
            engine.submit_frame(self.ring.slot_mut(idx))?;
            primed += 1;
        }

        // Steady state: each acquired slot is the oldest submission, so
        // its readback is the batch submitted `depth` rotations ago.
        if primed == depth {
            loop {
                let idx = self.ring.acquire();
                engine.read_output(self.ring.slot_mut(idx), |batch| {
                    deliver(batch, sink, validate, &mut stats)
                })?;

                let count = engine.stage_input(self.ring.slot_mut(idx), source)?;
                if count == 0 {
                    break;
                }
                metrics.increment(count as u64);
                stats.submitted += count as u64;
                engine.submit_frame(self.ring.slot_mut(idx))?;
            }
        }

        // Drain what is still in flight, in submission order.
        for _ in 0..depth {
            let idx = self.ring.acquire();
            if !self.ring.slot(idx).is_in_flight() {
                continue;
            }
            engine.read_output(self.ring.slot_mut(idx), |batch| {
                deliver(batch, sink, validate, &mut stats)
            })?;
        }

        engine.wait_idle()?;
        Ok(stats)
    }
}

fn deliver<S: HashSink>(batch: &[Candidate], sink: &mut S, validate: bool, stats: &mut RunStats) {
    if validate {
        for c in batch {
            let expected = lookup3::hashlittle(c.text(), 0);
            if c.hash != expected {
                stats.mismatch_count += 1;
                if stats.mismatches.len() < MAX_MISMATCH_REPORTS {
                    stats.mismatches.push(c.text_string());
                }
            }
        }
    }
    stats.delivered += batch.len() as u64;
    sink.consume(batch);
}

/// Hash a candidate stream on the host with the scalar stage.
///
/// Same provider/sink contract and metrics as the GPU path. Used when
/// no compute device is available, and by host-only tests, since both
/// stages produce identical hashes for identical candidates.
pub fn run_cpu<P, S>(
    source: &mut P,
    sink: &mut S,
    metrics: &Metrics,
    batch_capacity: usize,
) -> JhResult<RunStats>
where
    P: CandidateSource,
    S: HashSink,
{
    let mut buf = vec![Candidate::default(); batch_capacity.max(1)];
    let mut stats = RunStats::default();
    loop {
        let count = source.fill(&mut buf);
        if count == 0 {
            break;
        }
        for c in &mut buf[..count] {
            let hash = lookup3::hashlittle(c.text(), 0);
            c.hash = hash;
        }
        metrics.increment(count as u64);
        stats.submitted += count as u64;
        stats.delivered += count as u64;
        sink.consume(&buf[..count]);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use crate::source::{CollectSink, LineSource, PatternSource};

    fn lines(items: &[&str]) -> LineSource {
        LineSource::new(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_cpu_empty_provider_yields_no_sink_calls() {
        let metrics = Metrics::start();
        let mut source = lines(&[]);
        let mut sink = CollectSink::default();
        let stats = run_cpu(&mut source, &mut sink, &metrics, 64).unwrap();
        assert_eq!(stats.delivered, 0);
        assert!(sink.batches.is_empty());
        assert_eq!(metrics.total(), 0);
    }

    #[test]
    fn test_cpu_fixed_input_hashes_and_order() {
        let metrics = Metrics::start();
        let mut source = lines(&["FOO", "BAR", "BAZ"]);
        let mut sink = CollectSink::default();
        let stats = run_cpu(&mut source, &mut sink, &metrics, 64).unwrap();

        assert_eq!(stats.delivered, 3);
        assert_eq!(
            sink.entries,
            [
                ("FOO".to_string(), 0x7b0f_afd3),
                ("BAR".to_string(), 0xb7ab_f2f2),
                ("BAZ".to_string(), 0xd9de_240f),
            ]
        );
        assert_eq!(metrics.total(), 3);
    }

    #[test]
    fn test_cpu_batch_sizes_split_two_two_one() {
        let metrics = Metrics::start();
        let mut source = lines(&["P", "Q", "R", "S", "T"]);
        let mut sink = CollectSink::default();
        let stats = run_cpu(&mut source, &mut sink, &metrics, 2).unwrap();

        assert_eq!(sink.batches, [2, 2, 1]);
        assert_eq!(stats.submitted, 5);
        let texts: Vec<&str> = sink.entries.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, ["P", "Q", "R", "S", "T"]);
    }

    #[test]
    fn test_cpu_pattern_end_to_end() {
        let metrics = Metrics::start();
        let mut source = PatternSource::new(Pattern::new("A[0-2]B").unwrap());
        let mut sink = CollectSink::default();
        run_cpu(&mut source, &mut sink, &metrics, 64).unwrap();

        assert_eq!(
            sink.entries,
            [
                ("A0B".to_string(), 0x935a_16ff),
                ("A1B".to_string(), 0xf49d_b93a),
                ("A2B".to_string(), 0xd093_fef7),
            ]
        );
    }

    #[test]
    fn test_cpu_canonicalized_pattern_hash() {
        let metrics = Metrics::start();
        let mut source = PatternSource::new(Pattern::new("FOO/[0-9]/BAR.MP3").unwrap());
        let mut sink = CollectSink::default();
        let stats = run_cpu(&mut source, &mut sink, &metrics, 4).unwrap();

        assert_eq!(stats.delivered, 10);
        assert_eq!(sink.entries[0].0, "FOO\\0\\BAR.MP3");
        assert_eq!(sink.entries[0].1, 0x3277_a53e);
    }

    #[test]
    fn test_cpu_order_preserved_across_many_batches() {
        let items: Vec<String> = (0..100).map(|i| format!("ITEM{i}")).collect();
        let metrics = Metrics::start();
        let mut source = LineSource::new(items.clone());
        let mut sink = CollectSink::default();
        let stats = run_cpu(&mut source, &mut sink, &metrics, 7).unwrap();

        assert_eq!(stats.delivered, 100);
        let texts: Vec<String> = sink.entries.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(texts, items);
        for (text, hash) in &sink.entries {
            assert_eq!(*hash, lookup3::hashlittle(text.as_bytes(), 0));
        }
    }

    #[test]
    fn test_cpu_empty_line_hashes_to_initial_state() {
        let metrics = Metrics::start();
        let mut source = lines(&[""]);
        let mut sink = CollectSink::default();
        run_cpu(&mut source, &mut sink, &metrics, 8).unwrap();
        assert_eq!(sink.entries, [(String::new(), 0xdead_beef)]);
    }
}
