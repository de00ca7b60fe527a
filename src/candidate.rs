//! The fixed-size candidate record exchanged between host and device.
//!
//! Both sides see the identical 392-byte binary layout: a signed byte
//! count, the hash slot the shader writes back, and a zero-padded text
//! payload addressed by the shader as 96 little-endian `u32` words.

/// Capacity of the text payload in bytes.
pub const WORDS_CAPACITY: usize = 384;

/// Total record size in bytes (`char_count` + `hash` + `words`).
pub const RECORD_SIZE: usize = 4 + 4 + WORDS_CAPACITY;

/// One candidate string in the wire layout the compute shader consumes.
///
/// `words` bytes past `char_count` must stay zero: the shader folds the
/// trailing partial word into the hash as-is, so stale bytes there would
/// change the result.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// Number of valid bytes in `words`.
    pub char_count: i32,
    /// Computed hash; written by the device, read by the host.
    pub hash: u32,
    /// Raw candidate bytes, zero-padded on the right.
    pub words: [u8; WORDS_CAPACITY],
}

// SAFETY: Candidate is repr(C) with no padding (4 + 4 + 384 bytes) and
// every bit pattern is valid for its integer/byte fields.
unsafe impl bytemuck::Pod for Candidate {}
unsafe impl bytemuck::Zeroable for Candidate {}

impl Default for Candidate {
    fn default() -> Self {
        Candidate {
            char_count: 0,
            hash: 0,
            words: [0; WORDS_CAPACITY],
        }
    }
}

impl Candidate {
    /// Copy `text` into the payload, zeroing the tail and setting `char_count`.
    ///
    /// Panics if `text` exceeds [`WORDS_CAPACITY`]; providers are expected
    /// to reject over-long candidates before they get here.
    pub fn set_text(&mut self, text: &[u8]) {
        assert!(
            text.len() <= WORDS_CAPACITY,
            "candidate of {} bytes exceeds capacity {}",
            text.len(),
            WORDS_CAPACITY
        );
        self.words[..text.len()].copy_from_slice(text);
        self.words[text.len()..].fill(0);
        self.char_count = text.len() as i32;
    }

    /// The valid bytes of the payload.
    pub fn text(&self) -> &[u8] {
        let len = (self.char_count.max(0) as usize).min(WORDS_CAPACITY);
        &self.words[..len]
    }

    /// The payload as a lossily-decoded string, for reports and tests.
    pub fn text_string(&self) -> String {
        String::from_utf8_lossy(self.text()).into_owned()
    }
}
