use crate::error::{LogsError, Result};
use crate::sink::ReadableSink;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// Block size for the backward scan
const BLOCK_SIZE: u64 = 8192;

/// Read the last `n` complete lines of a file without loading the whole
/// file: seek to the end and scan backward one block at a time until
/// enough newlines have been seen.
///
/// Lines are returned oldest first, without their newline. A trailing
/// partial line (a record still being appended) is ignored.
pub fn tail_file(file: &mut File, n: usize) -> Result<Vec<Vec<u8>>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let len = file.metadata()?.len();
    let mut pos = len;
    let mut buf: Vec<u8> = Vec::new();

    while pos > 0 {
        let take = BLOCK_SIZE.min(pos);
        pos -= take;
        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; take as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;

        let newlines = buf.iter().filter(|&&b| b == b'\n').count();
        if newlines > n {
            break;
        }
    }

    // The first line is partial if we stopped mid-file
    if pos > 0 {
        if let Some(idx) = buf.iter().position(|&b| b == b'\n') {
            buf.drain(..=idx);
        }
    }
    // Drop an unterminated trailing record; the writer is still on it
    if buf.last() != Some(&b'\n') {
        match buf.iter().rposition(|&b| b == b'\n') {
            Some(idx) => buf.truncate(idx + 1),
            None => buf.clear(),
        }
    }

    let mut lines: Vec<Vec<u8>> = buf
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| line.to_vec())
        .collect();
    if lines.len() > n {
        lines.drain(..lines.len() - n);
    }
    Ok(lines)
}

/// Direct read handle to one generation, for unbounded replays that
/// stream a whole file instead of counting lines backward
pub fn generation_reader(sink: &dyn ReadableSink, index: usize) -> Result<File> {
    sink.open_generation(index)
}

/// Collect the chronologically last `lines` raw lines across up to
/// `max_generations` rotation generations, oldest first.
///
/// Generations are walked newest (0) to oldest; each older generation's
/// yield is prepended ahead of what is already collected, since it is
/// chronologically earlier. The walk stops as soon as the request is
/// satisfied. Running out of generations first is not an error: partial
/// history is returned as-is, and an unreadable generation ends the walk
/// with a warning rather than failing the replay.
pub fn tail_lines(sink: &dyn ReadableSink, max_generations: usize, lines: usize) -> Vec<Vec<u8>> {
    let mut collected: Vec<Vec<u8>> = Vec::new();
    let mut remaining = lines;

    for index in 0..max_generations {
        if remaining == 0 {
            break;
        }
        let mut file = match sink.open_generation(index) {
            Ok(file) => file,
            Err(LogsError::GenerationNotFound(_)) => break,
            Err(e) => {
                tracing::warn!(generation = index, error = %e, "skipping unreadable log generation");
                break;
            }
        };
        let yielded = match tail_file(&mut file, remaining) {
            Ok(yielded) => yielded,
            Err(e) => {
                tracing::warn!(generation = index, error = %e, "failed to tail log generation");
                break;
            }
        };

        let got = yielded.len();
        let mut merged = yielded;
        merged.extend(collected);
        collected = merged;

        if got == remaining {
            break;
        }
        remaining -= got;
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(path: &PathBuf, content: &str) {
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn open(path: &PathBuf) -> File {
        File::open(path).unwrap()
    }

    #[test]
    fn test_tail_file_last_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gen");
        write_file(&path, "a\nb\nc\nd\n");

        let lines = tail_file(&mut open(&path), 2).unwrap();
        assert_eq!(lines, vec![b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn test_tail_file_request_exceeds_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gen");
        write_file(&path, "a\nb\n");

        let lines = tail_file(&mut open(&path), 10).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_tail_file_ignores_partial_trailing_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gen");
        write_file(&path, "a\nb\npartial");

        let lines = tail_file(&mut open(&path), 5).unwrap();
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_tail_file_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gen");
        write_file(&path, "");

        assert!(tail_file(&mut open(&path), 3).unwrap().is_empty());
        assert!(tail_file(&mut open(&path), 0).unwrap().is_empty());
    }

    #[test]
    fn test_tail_file_spanning_blocks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gen");

        // Lines long enough that 3 of them straddle the 8 KiB block size
        let mut content = String::new();
        for i in 0..10 {
            content.push_str(&format!("{:04}-{}\n", i, "x".repeat(4000)));
        }
        write_file(&path, &content);

        let lines = tail_file(&mut open(&path), 3).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(b"0007"));
        assert!(lines[2].starts_with(b"0009"));
    }

    struct FakeStore {
        dir: PathBuf,
        count: usize,
    }

    impl ReadableSink for FakeStore {
        fn generation_count(&self) -> usize {
            self.count
        }

        fn open_generation(&self, index: usize) -> crate::error::Result<File> {
            File::open(self.dir.join(format!("gen-{}", index)))
                .map_err(|_| LogsError::GenerationNotFound(index))
        }
    }

    #[test]
    fn test_tail_lines_across_generations_oldest_first() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        // Generation 1 is older than generation 0
        write_file(&dir.join("gen-0"), "d\ne\n");
        write_file(&dir.join("gen-1"), "a\nb\nc\n");

        let store = FakeStore { dir, count: 2 };
        let lines = tail_lines(&store, 2, 4);
        assert_eq!(
            lines,
            vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]
        );
    }

    #[test]
    fn test_tail_lines_stops_when_satisfied() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        write_file(&dir.join("gen-0"), "x\ny\nz\n");
        write_file(&dir.join("gen-1"), "a\nb\n");

        let store = FakeStore { dir, count: 2 };
        let lines = tail_lines(&store, 2, 2);
        assert_eq!(lines, vec![b"y".to_vec(), b"z".to_vec()]);
    }

    #[test]
    fn test_tail_lines_partial_history_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        write_file(&dir.join("gen-0"), "only\n");

        let store = FakeStore { dir, count: 3 };
        let lines = tail_lines(&store, 3, 10);
        assert_eq!(lines, vec![b"only".to_vec()]);
    }
}
