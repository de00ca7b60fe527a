//! Cross-module validation tests: the laws that tie the pattern engine,
//! the candidate record and the hashing stage together.

use crate::candidate::{Candidate, WORDS_CAPACITY};
use crate::lookup3;
use crate::metrics::Metrics;
use crate::pattern::Pattern;
use crate::scheduler::run_cpu;
use crate::source::{CandidateSource, CollectSink, LineSource, PatternSource};

/// Exhaust a pattern, asserting the record layout law for every value.
fn drain(pattern: &str) -> Vec<String> {
    let mut p = Pattern::new(pattern).unwrap();
    let mut c = Candidate::default();
    let mut values = Vec::new();
    while p.write(&mut c) {
        let len = c.char_count as usize;
        assert!(len <= WORDS_CAPACITY);
        assert!(
            c.words[len..].iter().all(|&b| b == 0),
            "stale bytes after candidate {:?}",
            c.text_string()
        );
        values.push(c.text_string());
    }
    values
}

#[test]
fn enumeration_is_a_bijection() {
    for pattern in [
        "[a-d]",
        "[a-b]{3}",
        "[a-c]{0,3}",
        "(on|off){1,2}",
        "KEY[0-3](A|BB){2}",
        "[num]{2}[a-b]",
        "x(a||b)",
    ] {
        let count = Pattern::new(pattern).unwrap().count();
        let values = drain(pattern);
        assert_eq!(values.len() as u64, count, "count law for {pattern}");
        let unique: std::collections::BTreeSet<_> = values.iter().collect();
        assert_eq!(unique.len(), values.len(), "repeat in {pattern}");
    }
}

#[test]
fn enumeration_order_is_stable_across_batch_sizes() {
    // The provider boundary must not affect the emission order.
    let full = drain("[a-c]{1,3}");
    for capacity in [1usize, 2, 7, 64] {
        let mut source = PatternSource::new(Pattern::new("[a-c]{1,3}").unwrap());
        let mut buf = vec![Candidate::default(); capacity];
        let mut seen = Vec::new();
        loop {
            let n = source.fill(&mut buf);
            if n == 0 {
                break;
            }
            seen.extend(buf[..n].iter().map(|c| c.text_string()));
        }
        assert_eq!(seen, full, "capacity {capacity}");
    }
}

#[test]
fn cpu_stage_matches_reference_for_all_lengths() {
    // One candidate per payload length, crossing every mix-block boundary.
    let lines: Vec<String> = (0..=WORDS_CAPACITY)
        .map(|n| "ABCDEFGHIJKLMNOPQRSTUVWXYZ".chars().cycle().take(n).collect())
        .collect();

    let metrics = Metrics::start();
    let mut source = LineSource::new(lines.clone());
    let mut sink = CollectSink::default();
    let stats = run_cpu(&mut source, &mut sink, &metrics, 33).unwrap();

    assert_eq!(stats.delivered as usize, lines.len());
    for (line, (text, hash)) in lines.iter().zip(&sink.entries) {
        assert_eq!(line, text);
        assert_eq!(*hash, lookup3::hashlittle(line.as_bytes(), 0));
    }
}

#[test]
fn hashword_agrees_with_hashlittle_on_aligned_keys() {
    // The two entry points are the same function on word-sized keys;
    // the shader relies on exactly this equivalence for its tail.
    for len in [0usize, 4, 8, 12, 16, 24, 100] {
        let data: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
        let words: Vec<u32> = data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(
            lookup3::hashlittle(&data, 5),
            lookup3::hashword(&words, 5),
            "length {len}"
        );
    }
}

#[test]
fn delivery_conserves_count_and_order() {
    let lines: Vec<String> = (0..257).map(|i| format!("LINE/{i}")).collect();
    for capacity in [1usize, 3, 64, 300] {
        let metrics = Metrics::start();
        let mut source = LineSource::new(lines.clone());
        let mut sink = CollectSink::default();
        let stats = run_cpu(&mut source, &mut sink, &metrics, capacity).unwrap();

        assert_eq!(stats.submitted, 257);
        assert_eq!(stats.delivered, 257);
        assert_eq!(metrics.total(), 257);
        assert_eq!(sink.batches.iter().sum::<usize>(), 257);
        let texts: Vec<String> = sink.entries.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(texts, lines);
    }
}
