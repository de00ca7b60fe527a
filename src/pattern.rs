//! Pattern expansion engine.
//!
//! A pattern is a sequence of segments: literal text, an alternation
//! `(a|b|c){min,max}`, or a character class `[range|range]{min,max}`
//! where a range is a named alphabet (`hex`, `alpha`, `num`, `alnum`,
//! `path`) or `a-z`. Segments multiply: the pattern enumerates the
//! Cartesian product of its segment values, lazily and in a stable
//! order, with the rightmost segment varying fastest.
//!
//! Text is canonicalized the way the hashed corpus expects: uppercased,
//! forward slashes rewritten to backslashes, escape characters stripped.
//!
//! ```
//! use jenhash::pattern::Pattern;
//!
//! let p = Pattern::new("A[0-2]B").unwrap();
//! assert_eq!(p.count(), 3);
//! ```

use crate::candidate::{Candidate, WORDS_CAPACITY};
use crate::{JhError, JhResult};

const HEX_ALPHABET: &[u8] = b"ABCDEF0123456789";
const ALPHA_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ ";
const NUM_ALPHABET: &[u8] = b"0123456789";
const ALNUM_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 ";
const PATH_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_. \\";

/// Canonical form of one pattern character.
#[inline]
fn canon(c: u8) -> u8 {
    if c == b'/' {
        b'\\'
    } else {
        c.to_ascii_uppercase()
    }
}

/// Number of values of a segment repeated `min..=max` times over `m`
/// choices per repeat: the geometric series sum of `m^k`, saturating.
fn repeat_count(m: u64, min: u32, max: u32) -> u64 {
    if m == 1 {
        return (max - min + 1) as u64;
    }
    let m = m as u128;
    let mut term: u128 = match m.checked_pow(min) {
        Some(t) => t,
        None => return u64::MAX,
    };
    let mut total: u128 = 0;
    for _ in min..=max {
        total = total.saturating_add(term);
        term = term.checked_mul(m).unwrap_or(u128::MAX);
    }
    total.min(u64::MAX as u128) as u64
}

/// One parsed segment of a pattern.
///
/// Each variant carries its own enumeration state: a cursor vector with
/// one index per repeat position, plus the current repeat length for the
/// variable-length variants. The cursor vector is a little odometer of
/// its own, expanding by one position whenever every index wraps.
#[derive(Debug, Clone)]
enum Node {
    /// Fixed text run.
    Literal { bytes: Vec<u8> },
    /// `(a|b|c){min,max}`: one of the choices, repeated.
    Alternation {
        choices: Vec<Vec<u8>>,
        min: u32,
        max: u32,
        reps: u32,
        cursors: Vec<usize>,
    },
    /// `[..]{min,max}`: characters drawn from a sorted alphabet.
    CharClass {
        universe: Vec<u8>,
        min: u32,
        max: u32,
        len: u32,
        cursors: Vec<usize>,
    },
}

impl Node {
    /// Number of distinct values this segment can produce.
    fn count(&self) -> u64 {
        match self {
            Node::Literal { .. } => 1,
            Node::Alternation {
                choices, min, max, ..
            } => repeat_count(choices.len() as u64, *min, *max),
            Node::CharClass {
                universe, min, max, ..
            } => repeat_count(universe.len() as u64, *min, *max),
        }
    }

    /// Longest value this segment can render, in bytes.
    fn max_len(&self) -> usize {
        match self {
            Node::Literal { bytes } => bytes.len(),
            Node::Alternation { choices, max, .. } => {
                let widest = choices.iter().map(Vec::len).max().unwrap_or(0);
                widest.saturating_mul(*max as usize)
            }
            Node::CharClass { max, .. } => *max as usize,
        }
    }

    /// Append the current value to `out`, returning the bytes written.
    fn render(&self, out: &mut [u8]) -> usize {
        match self {
            Node::Literal { bytes } => {
                out[..bytes.len()].copy_from_slice(bytes);
                bytes.len()
            }
            Node::Alternation {
                choices, cursors, ..
            } => {
                let mut n = 0;
                for &cur in cursors {
                    let choice = &choices[cur];
                    out[n..n + choice.len()].copy_from_slice(choice);
                    n += choice.len();
                }
                n
            }
            Node::CharClass {
                universe, cursors, ..
            } => {
                for (i, &cur) in cursors.iter().enumerate() {
                    out[i] = universe[cur];
                }
                cursors.len()
            }
        }
    }

    /// Whether another value remains after the current one.
    fn has_next(&self) -> bool {
        match self {
            Node::Literal { .. } => false,
            Node::Alternation {
                choices,
                max,
                reps,
                cursors,
                ..
            } => *reps < *max || cursors.iter().any(|&c| c + 1 < choices.len()),
            Node::CharClass {
                universe,
                max,
                len,
                cursors,
                ..
            } => *len < *max || cursors.iter().any(|&c| c + 1 < universe.len()),
        }
    }

    /// Advance to the next value. Caller checks `has_next()` first.
    fn move_next(&mut self) {
        match self {
            Node::Literal { .. } => {}
            Node::Alternation {
                choices,
                reps,
                cursors,
                ..
            } => {
                if !roll(cursors, choices.len()) {
                    *reps += 1;
                    cursors.push(0);
                }
            }
            Node::CharClass {
                universe,
                len,
                cursors,
                ..
            } => {
                if !roll(cursors, universe.len()) {
                    *len += 1;
                    cursors.push(0);
                }
            }
        }
    }

    /// Return to the first value.
    fn reset(&mut self) {
        match self {
            Node::Literal { .. } => {}
            Node::Alternation { min, reps, cursors, .. } => {
                *reps = *min;
                cursors.clear();
                cursors.resize(*min as usize, 0);
            }
            Node::CharClass { min, len, cursors, .. } => {
                *len = *min;
                cursors.clear();
                cursors.resize(*min as usize, 0);
            }
        }
    }
}

/// Increment a cursor vector in place-value order, rightmost fastest.
/// Returns false once every position has wrapped back to zero.
fn roll(cursors: &mut [usize], radix: usize) -> bool {
    for cur in cursors.iter_mut().rev() {
        *cur += 1;
        if *cur < radix {
            return true;
        }
        *cur = 0;
    }
    false
}

/// A parsed pattern, enumerating its candidate values exactly once each.
///
/// The segment chain forms an odometer: exactly one segment (initially
/// the tail) is unlocked at any time. The unlocked segment advances on
/// each emission; when it wraps it locks itself, resets, and unlocks its
/// predecessor, and whenever a non-tail segment advances successfully it
/// hands the unlock straight back to the tail. The result is standard
/// place-value counting with the rightmost wheel fastest.
#[derive(Debug, Clone)]
pub struct Pattern {
    nodes: Vec<Node>,
    locked: Vec<bool>,
    total: u64,
    emitted: u64,
}

impl Pattern {
    /// Parse a pattern expression.
    pub fn new(text: &str) -> JhResult<Self> {
        let (nodes, starts) = parse_nodes(text)?;

        let mut rendered = 0usize;
        for (node, &start) in nodes.iter().zip(&starts) {
            rendered = rendered.saturating_add(node.max_len());
            if rendered > WORDS_CAPACITY {
                return Err(JhError::Pattern {
                    position: start,
                    reason: format!("pattern can exceed the {WORDS_CAPACITY}-byte candidate capacity"),
                });
            }
        }

        let total = nodes.iter().fold(1u64, |acc, n| acc.saturating_mul(n.count()));
        let mut locked = vec![true; nodes.len()];
        *locked.last_mut().unwrap() = false;

        Ok(Pattern {
            nodes,
            locked,
            total,
            emitted: 0,
        })
    }

    /// Replace this pattern's contents by parsing `text`.
    pub fn load(&mut self, text: &str) -> JhResult<()> {
        *self = Self::new(text)?;
        Ok(())
    }

    /// Total number of candidates the pattern produces (saturating).
    pub fn count(&self) -> u64 {
        self.total
    }

    /// True while candidates remain.
    pub fn has_next(&self) -> bool {
        self.emitted < self.total
    }

    /// Render the current candidate into `out` and advance.
    ///
    /// Returns false once the enumeration is exhausted; `out` is left
    /// untouched in that case.
    pub fn write(&mut self, out: &mut Candidate) -> bool {
        if !self.has_next() {
            return false;
        }

        let mut len = 0;
        for node in &self.nodes {
            len += node.render(&mut out.words[len..]);
        }
        out.words[len..].fill(0);
        out.char_count = len as i32;

        self.emitted += 1;
        self.advance();
        true
    }

    /// Restart the enumeration from the first candidate.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
        for l in &mut self.locked {
            *l = true;
        }
        *self.locked.last_mut().unwrap() = false;
        self.emitted = 0;
    }

    fn advance(&mut self) {
        let tail = self.nodes.len() - 1;
        loop {
            let Some(i) = self.locked.iter().position(|l| !*l) else {
                return;
            };
            if self.nodes[i].has_next() {
                self.nodes[i].move_next();
                if i != tail {
                    self.locked[i] = true;
                    self.locked[tail] = false;
                }
                return;
            }
            // Wrapped: reset this wheel and hand control to the left.
            self.nodes[i].reset();
            self.locked[i] = true;
            if i == 0 {
                // First wheel done; the emitted counter ends the run.
                return;
            }
            self.locked[i - 1] = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

fn parse_nodes(text: &str) -> JhResult<(Vec<Node>, Vec<usize>)> {
    let src = text.as_bytes();
    if src.is_empty() {
        return Err(err(0, "empty pattern"));
    }

    let mut p = Parser { src, pos: 0 };
    let mut nodes = Vec::new();
    let mut starts = Vec::new();
    while p.pos < p.src.len() {
        starts.push(p.pos);
        let node = match p.src[p.pos] {
            b'(' => p.parse_alternation()?,
            b'[' => p.parse_class()?,
            _ => p.parse_literal()?,
        };
        nodes.push(node);
    }
    Ok((nodes, starts))
}

fn err(position: usize, reason: impl Into<String>) -> JhError {
    JhError::Pattern {
        position,
        reason: reason.into(),
    }
}

impl<'a> Parser<'a> {
    /// Consume text up to the next unescaped `(` or `[`.
    fn parse_literal(&mut self) -> JhResult<Node> {
        let mut bytes = Vec::new();
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b'(' | b'[' => break,
                b'\\' => {
                    let Some(&escaped) = self.src.get(self.pos + 1) else {
                        return Err(err(self.pos, "dangling escape"));
                    };
                    bytes.push(canon(escaped));
                    self.pos += 2;
                }
                c => {
                    bytes.push(canon(c));
                    self.pos += 1;
                }
            }
        }
        Ok(Node::Literal { bytes })
    }

    /// Parse `(choice|choice|..)` plus an optional size suffix.
    fn parse_alternation(&mut self) -> JhResult<Node> {
        let open = self.pos;
        self.pos += 1; // consume '('

        let mut choices = Vec::new();
        let mut current = Vec::new();
        loop {
            let Some(&c) = self.src.get(self.pos) else {
                return Err(err(open, "unterminated group"));
            };
            match c {
                b')' => {
                    self.pos += 1;
                    choices.push(current);
                    break;
                }
                b'|' => {
                    self.pos += 1;
                    choices.push(std::mem::take(&mut current));
                }
                b'\\' => {
                    let Some(&escaped) = self.src.get(self.pos + 1) else {
                        return Err(err(self.pos, "dangling escape"));
                    };
                    current.push(canon(escaped));
                    self.pos += 2;
                }
                c => {
                    current.push(canon(c));
                    self.pos += 1;
                }
            }
        }

        let (min, max) = self.parse_size()?;
        let reps = min;
        Ok(Node::Alternation {
            choices,
            min,
            max,
            reps,
            cursors: vec![0; min as usize],
        })
    }

    /// Parse `[range|range|..]` plus an optional size suffix.
    fn parse_class(&mut self) -> JhResult<Node> {
        let open = self.pos;
        self.pos += 1; // consume '['

        let mut universe = std::collections::BTreeSet::new();
        let mut spec = Vec::new();
        let mut spec_start = self.pos;
        loop {
            let Some(&c) = self.src.get(self.pos) else {
                return Err(err(open, "unterminated character class"));
            };
            match c {
                b']' => {
                    self.pos += 1;
                    add_range(&mut universe, &spec, spec_start)?;
                    break;
                }
                b'|' => {
                    self.pos += 1;
                    add_range(&mut universe, &spec, spec_start)?;
                    spec.clear();
                    spec_start = self.pos;
                }
                b'\\' => {
                    let Some(&escaped) = self.src.get(self.pos + 1) else {
                        return Err(err(self.pos, "dangling escape"));
                    };
                    spec.push(escaped);
                    self.pos += 2;
                }
                c => {
                    spec.push(c);
                    self.pos += 1;
                }
            }
        }

        if universe.is_empty() {
            return Err(err(open, "empty character class"));
        }

        let (min, max) = self.parse_size()?;
        let len = min;
        Ok(Node::CharClass {
            universe: universe.into_iter().collect(),
            min,
            max,
            len,
            cursors: vec![0; min as usize],
        })
    }

    /// Parse `{n}` or `{min,max}`; absent means exactly once.
    fn parse_size(&mut self) -> JhResult<(u32, u32)> {
        if self.src.get(self.pos) != Some(&b'{') {
            return Ok((1, 1));
        }
        let open = self.pos;
        self.pos += 1;

        let end = self.src[self.pos..]
            .iter()
            .position(|&c| c == b'}')
            .map(|ofs| self.pos + ofs)
            .ok_or_else(|| err(open, "unterminated size"))?;
        let body = &self.src[self.pos..end];
        self.pos = end + 1;

        let parse_num = |digits: &[u8]| -> JhResult<u32> {
            std::str::from_utf8(digits)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| err(open, "invalid repeat count"))
        };

        match body.iter().position(|&c| c == b',') {
            None => {
                let n = parse_num(body)?;
                Ok((n, n))
            }
            Some(comma) => {
                let min = parse_num(&body[..comma])?;
                let max = parse_num(&body[comma + 1..])?;
                if min > max {
                    return Err(err(open, "reversed repeat range"));
                }
                Ok((min, max))
            }
        }
    }
}

/// Expand one range spec (`hex`, `alpha`, `num`, `alnum`, `path` or
/// `a-z`) into the class universe.
fn add_range(
    universe: &mut std::collections::BTreeSet<u8>,
    spec: &[u8],
    position: usize,
) -> JhResult<()> {
    let alphabet: &[u8] = match std::str::from_utf8(spec).unwrap_or("") {
        "hex" => HEX_ALPHABET,
        "alpha" => ALPHA_ALPHABET,
        "num" => NUM_ALPHABET,
        "alnum" | "alphanum" => ALNUM_ALPHABET,
        "path" => PATH_ALPHABET,
        _ => {
            let &[lo, b'-', hi] = spec else {
                return Err(err(position, "invalid range"));
            };
            let lo = canon(lo);
            let hi = canon(hi);
            if lo > hi {
                return Err(err(position, "invalid range"));
            }
            universe.extend(lo..=hi);
            return Ok(());
        }
    };
    universe.extend(alphabet.iter().copied());
    Ok(())
}
