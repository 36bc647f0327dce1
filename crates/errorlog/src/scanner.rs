// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Lines longer than this are dropped rather than buffered whole, so a corrupt or binary log
/// can't make the uploader allocate unboundedly.
const MAX_LINE_BYTES: usize = 5 * 1024 * 1024;

/// Errors reading the tailed log file.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The file could not be opened or read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// The path involved.
        path: std::path::PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Reads every complete line appended to `path` since `offset`, returning the lines and the new
/// offset (the byte position just past the last complete line read; a trailing partial line is
/// left for the next call).
///
/// If `path` is shorter than `offset` (rotated/truncated since the last read), resumes from the
/// start of the file. A line longer than [`MAX_LINE_BYTES`] — "token too long" — is dropped
/// rather than returned, but scanning continues past it.
///
/// # Errors
/// Returns [`ScanError::Io`] if the file can't be opened or read. A missing file is not an
/// error: it returns `(vec![], offset)` unchanged, since log files may not exist yet at startup.
pub fn scan_new_lines(path: &Path, offset: u64) -> Result<(Vec<String>, u64), ScanError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), offset)),
        Err(e) => return Err(ScanError::Io { path: path.to_path_buf(), source: e }),
    };

    let len = file.metadata().map_err(|e| ScanError::Io { path: path.to_path_buf(), source: e })?.len();
    let start = if offset > len { 0 } else { offset };

    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(start))
        .map_err(|e| ScanError::Io { path: path.to_path_buf(), source: e })?;

    let mut lines = Vec::new();
    let mut position = start;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| ScanError::Io { path: path.to_path_buf(), source: e })?;
        if read == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            // Partial trailing line with no newline yet: don't advance past it.
            break;
        }
        position += read as u64;
        if buf.len() <= MAX_LINE_BYTES {
            let text = String::from_utf8_lossy(&buf[..buf.len() - 1]).into_owned();
            lines.push(text);
        }
    }

    Ok((lines, position))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_only_lines_appended_since_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.log");
        std::fs::write(&path, "first\nsecond\n").unwrap();

        let (lines, offset) = scan_new_lines(&path, 0).unwrap();
        assert_eq!(lines, vec!["first", "second"]);

        std::fs::write(&path, "first\nsecond\nthird\n").unwrap();
        let (more, _offset2) = scan_new_lines(&path, offset).unwrap();
        assert_eq!(more, vec!["third"]);
    }

    #[test]
    fn leaves_partial_trailing_line_for_next_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.log");
        std::fs::write(&path, "complete\npartial").unwrap();

        let (lines, offset) = scan_new_lines(&path, 0).unwrap();
        assert_eq!(lines, vec!["complete"]);

        std::fs::write(&path, "complete\npartial-now-done\n").unwrap();
        let (more, _) = scan_new_lines(&path, offset).unwrap();
        assert_eq!(more, vec!["partial-now-done"]);
    }

    #[test]
    fn truncated_file_resets_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.log");
        std::fs::write(&path, "aaaaaaaaaa\n").unwrap();
        let (_, offset) = scan_new_lines(&path, 0).unwrap();

        std::fs::write(&path, "short\n").unwrap();
        let (lines, _) = scan_new_lines(&path, offset).unwrap();
        assert_eq!(lines, vec!["short"]);
    }

    #[test]
    fn missing_file_returns_empty_without_error() {
        let (lines, offset) = scan_new_lines(Path::new("/nonexistent/x.log"), 0).unwrap();
        assert!(lines.is_empty());
        assert_eq!(offset, 0);
    }
}
