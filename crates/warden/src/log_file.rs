//! Backward reading of the daemon's append-only log.
//!
//! Crash diagnostics sit at the end of a log that may be arbitrarily large,
//! so [`ReverseLines`] reads it from the end in fixed-size windows and never
//! loads more than the lines it yields plus one window.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};

use crate::sentinel;

/// Default backward read window, in bytes.
pub const DEFAULT_WINDOW: usize = 128;

/// Trailing lines searched for the crash sentinel.
pub const CRASH_SCAN_LINES: usize = 3;

/// Iterator over the lines of a seekable source, last line first.
///
/// Yields the same lines as [`str::lines`] on the whole content, in reverse:
/// a final newline does not produce an empty last line, and `\r\n` endings
/// lose their `\r`. Invalid UTF-8 is replaced lossily, per line.
#[derive(Debug)]
pub struct ReverseLines<R> {
    source: R,
    window: usize,
    cursor: u64,
    pending: VecDeque<u8>,
    unsearched: usize,
    newline_terminated: bool,
    started: bool,
    finished: bool,
}

impl<R: Read + Seek> ReverseLines<R> {
    /// Starts reading backward from the end of `source`.
    ///
    /// A zero `window` is treated as one byte.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while seeking to the end.
    pub fn new(mut source: R, window: usize) -> io::Result<Self> {
        let cursor = source.seek(SeekFrom::End(0))?;
        Ok(Self {
            source,
            window: window.max(1),
            cursor,
            pending: VecDeque::new(),
            unsearched: 0,
            newline_terminated: false,
            started: false,
            finished: cursor == 0,
        })
    }

    /// Prepends the window before the cursor to the pending bytes.
    fn read_window(&mut self) -> io::Result<()> {
        let length = self.cursor.min(self.window as u64);
        self.cursor -= length;
        self.source.seek(SeekFrom::Start(self.cursor))?;
        let mut chunk = vec![0; usize::try_from(length).unwrap_or(self.window)];
        self.source.read_exact(&mut chunk)?;
        if !self.started {
            self.started = true;
            if chunk.last() == Some(&b'\n') {
                chunk.pop();
                self.newline_terminated = true;
            }
        }
        self.unsearched = chunk.len();
        self.pending.reserve(chunk.len());
        for byte in chunk.into_iter().rev() {
            self.pending.push_front(byte);
        }
        Ok(())
    }

    fn emit(&mut self, mut line: Vec<u8>) -> String {
        if self.newline_terminated && line.last() == Some(&b'\r') {
            line.pop();
        }
        self.newline_terminated = true;
        String::from_utf8_lossy(&line).into_owned()
    }

    fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            // Bytes beyond `unsearched` were scanned on an earlier pass.
            let fresh = self.unsearched.min(self.pending.len());
            let separator = self
                .pending
                .range(..fresh)
                .rposition(|byte| *byte == b'\n');
            if let Some(index) = separator {
                let line = self.pending.split_off(index + 1);
                self.pending.truncate(index);
                self.unsearched = self.pending.len();
                return Ok(Some(self.emit(line.into())));
            }
            if self.cursor == 0 {
                self.finished = true;
                let line = mem::take(&mut self.pending);
                return Ok(Some(self.emit(line.into())));
            }
            self.read_window()?;
        }
    }
}

impl<R: Read + Seek> Iterator for ReverseLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_line() {
            Ok(line) => line.map(Ok),
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

/// The daemon's log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    path: PathBuf,
    window: usize,
}

impl LogFile {
    /// Wraps the log at `path` with the default read window.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            window: DEFAULT_WINDOW,
        }
    }

    /// Overrides the backward read window.
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Location of the log.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Opens the log for backward reading.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while opening or seeking.
    pub fn reverse_lines(&self) -> io::Result<ReverseLines<File>> {
        ReverseLines::new(File::open(&self.path)?, self.window)
    }

    /// Collects lines from the end back to the first line matching
    /// `predicate` (inclusive), or to the start of the file, and returns them
    /// in file order. A missing log has no lines.
    ///
    /// # Errors
    ///
    /// Returns IO errors other than the log not existing.
    pub fn tail<P>(&self, mut predicate: P) -> io::Result<Vec<String>>
    where
        P: FnMut(&str) -> bool,
    {
        let lines = match self.reverse_lines() {
            Ok(lines) => lines,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        let mut collected = Vec::new();
        for line in lines {
            let line = line?;
            let matched = predicate(&line);
            collected.push(line);
            if matched {
                break;
            }
        }
        collected.reverse();
        Ok(collected)
    }

    /// The last `count` lines, in file order.
    ///
    /// # Errors
    ///
    /// As [`LogFile::tail`].
    pub fn last_lines(&self, count: usize) -> io::Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut seen = 0;
        self.tail(|_| {
            seen += 1;
            seen >= count
        })
    }

    /// Whether the crash sentinel appears among the last
    /// [`CRASH_SCAN_LINES`] lines. Unreadable logs report no crash.
    #[must_use]
    pub fn crashed(&self) -> bool {
        self.last_lines(CRASH_SCAN_LINES)
            .is_ok_and(|lines| lines.iter().any(|line| line == sentinel::DAEMON_CRASHED))
    }

    /// As [`LogFile::crashed`], but the scan stops at the latest activation
    /// mark, so a crash left by an earlier activation does not count.
    #[must_use]
    pub fn crashed_since_mark(&self) -> bool {
        let Ok(lines) = self.reverse_lines() else {
            return false;
        };
        for line in lines.take(CRASH_SCAN_LINES) {
            match line {
                Ok(line) if line == sentinel::DAEMON_CRASHED => return true,
                Ok(line) if line.starts_with(sentinel::LOG_MARKED_PREFIX) => return false,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }

    /// Output of the most recent crash: everything after the last activation
    /// mark or crash report header, including that header.
    ///
    /// # Errors
    ///
    /// As [`LogFile::tail`].
    pub fn crash_tail(&self) -> io::Result<Vec<String>> {
        self.tail(sentinel::is_crash_tail_boundary)
    }

    /// Appends an activation mark naming `pid`, creating the log if needed.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while opening or writing.
    pub fn mark(&self, pid: u32) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", sentinel::log_marked(pid))
    }
}
