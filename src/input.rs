//! Candidate input files: one candidate per line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::candidate::WORDS_CAPACITY;
use crate::{JhError, JhResult};

/// A fully loaded candidate file.
///
/// Trailing newlines are stripped; empty lines are kept as zero-length
/// candidates. Lines longer than the record capacity are rejected here,
/// before any device work starts.
#[derive(Debug, Clone)]
pub struct InputFile {
    lines: Vec<String>,
}

impl InputFile {
    pub fn open(path: &Path) -> JhResult<Self> {
        let file = File::open(path)
            .map_err(|e| JhError::Config(format!("{}: {e}", path.display())))?;
        let reader = BufReader::new(file);

        let mut lines = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| JhError::Config(format!("{}: {e}", path.display())))?;
            if line.len() > WORDS_CAPACITY {
                return Err(JhError::Config(format!(
                    "{}:{}: line of {} bytes exceeds the {WORDS_CAPACITY}-byte candidate capacity",
                    path.display(),
                    index + 1,
                    line.len()
                )));
            }
            lines.push(line);
        }
        Ok(InputFile { lines })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("jenhash-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_open_reads_lines_in_order() {
        let path = temp_path("lines.txt");
        let mut f = File::create(&path).unwrap();
        write!(f, "FOO\nBAR\n\nBAZ\n").unwrap();
        drop(f);

        let input = InputFile::open(&path).unwrap();
        assert_eq!(input.len(), 4);
        assert_eq!(input.into_lines(), ["FOO", "BAR", "", "BAZ"]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = InputFile::open(Path::new("/no/such/jenhash/input"));
        assert!(matches!(result, Err(JhError::Config(_))));
    }

    #[test]
    fn test_overlong_line_rejected() {
        let path = temp_path("long.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "{}", "A".repeat(WORDS_CAPACITY + 1)).unwrap();
        drop(f);

        let result = InputFile::open(&path);
        assert!(matches!(result, Err(JhError::Config(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
