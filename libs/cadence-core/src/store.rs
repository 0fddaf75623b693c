use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Lines, Write};
use std::path::{Path, PathBuf};

use crate::error::CadenceError;
use crate::record::MessageRecord;

// ════════════════════════════════════════════════════════════════
//  File naming / rollover
// ════════════════════════════════════════════════════════════════

/// Имя файла записи для данного индекса.
pub fn recording_file_name(base: &str, index: u32) -> String {
    format!("{base}_{index}.jsonl")
}

fn parse_index(name: &str, base: &str) -> Option<u32> {
    let digits = name
        .strip_prefix(base)?
        .strip_prefix('_')?
        .strip_suffix(".jsonl")?;
    digits.parse().ok()
}

/// All recording files in `dir` matching `{base}_{N}.jsonl`, sorted by
/// index descending (most recent first). Shared by `--list` and "latest"
/// resolution so both always agree on what "latest" means.
fn scan_recordings(dir: &Path, base: &str) -> Result<Vec<(u32, PathBuf)>, CadenceError> {
    let entries = match fs::read_dir(dir) {
        Ok(d) => d,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CadenceError::StoreUnavailable(format!(
                "read dir {}: {e}",
                dir.display()
            )));
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(index) = parse_index(&name, base) {
            found.push((index, entry.path()));
        }
    }
    found.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(found)
}

/// Next unused file index: highest existing index + 1, starting at 1.
///
/// A pure directory scan — callable on its own, without a session.
pub fn next_index(dir: &Path, base: &str) -> Result<u32, CadenceError> {
    let found = scan_recordings(dir, base)?;
    Ok(found.first().map(|(index, _)| index + 1).unwrap_or(1))
}

// ════════════════════════════════════════════════════════════════
//  RecordingSession — append-only writer
// ════════════════════════════════════════════════════════════════

/// One recorder run's open store file. Owns the file handle exclusively;
/// the file is never reopened or overwritten by a later session.
pub struct RecordingSession {
    path: PathBuf,
    index: u32,
    file: File,
    fsync: bool,
    written: u64,
}

impl RecordingSession {
    /// Allocate the next free index in `dir` and create the file.
    ///
    /// `create_new` guarantees an existing file is never clobbered: if a
    /// concurrent session grabbed the same index, we advance and retry.
    pub fn create(dir: &Path, base: &str, fsync: bool) -> Result<Self, CadenceError> {
        fs::create_dir_all(dir).map_err(|e| {
            CadenceError::StoreUnavailable(format!("mkdir {}: {e}", dir.display()))
        })?;

        let mut index = next_index(dir, base)?;
        loop {
            let path = dir.join(recording_file_name(base, index));
            match OpenOptions::new().create_new(true).append(true).open(&path) {
                Ok(file) => {
                    return Ok(Self {
                        path,
                        index,
                        file,
                        fsync,
                        written: 0,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    index += 1;
                }
                Err(e) => {
                    return Err(CadenceError::StoreUnavailable(format!(
                        "create {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    }

    /// Append a batch, one JSON line per record, in order.
    ///
    /// The whole batch is serialized first and written with a single
    /// `write_all`, so a batch either lands completely or the caller keeps
    /// it for retry. Returns the number of records written.
    pub fn append(&mut self, records: &[MessageRecord]) -> Result<usize, CadenceError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut buf = Vec::with_capacity(records.len() * 64);
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        self.file.write_all(&buf).map_err(|e| {
            CadenceError::StoreUnavailable(format!("write {}: {e}", self.path.display()))
        })?;
        if self.fsync {
            self.file.sync_data().map_err(|e| {
                CadenceError::StoreUnavailable(format!("sync {}: {e}", self.path.display()))
            })?;
        }

        self.written += records.len() as u64;
        Ok(records.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Records persisted so far in this session.
    pub fn written(&self) -> u64 {
        self.written
    }
}

// ════════════════════════════════════════════════════════════════
//  Listing
// ════════════════════════════════════════════════════════════════

/// Summary of one recording file, for `--list` and operator inspection.
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    pub name: String,
    pub path: PathBuf,
    pub index: u32,
    /// Valid records only — malformed lines are not counted.
    pub records: u64,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub bytes: u64,
}

/// Enumerate recordings in `dir`, most recent first.
pub fn list_recordings(dir: &Path, base: &str) -> Result<Vec<RecordingSummary>, CadenceError> {
    let mut summaries = Vec::new();
    for (index, path) in scan_recordings(dir, base)? {
        summaries.push(summarize(&path, index)?);
    }
    Ok(summaries)
}

fn summarize(path: &Path, index: u32) -> Result<RecordingSummary, CadenceError> {
    let bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let mut records = 0u64;
    let mut first_timestamp = None;
    let mut last_timestamp = None;
    for item in RecordingCursor::open(path.to_path_buf())? {
        match item {
            Ok(record) => {
                records += 1;
                if first_timestamp.is_none() {
                    first_timestamp = Some(record.timestamp);
                }
                last_timestamp = Some(record.timestamp);
            }
            Err(CadenceError::MalformedRecord { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(RecordingSummary {
        name,
        path: path.to_path_buf(),
        index,
        records,
        first_timestamp,
        last_timestamp,
        bytes,
    })
}

// ════════════════════════════════════════════════════════════════
//  Replay cursor
// ════════════════════════════════════════════════════════════════

/// Which recording to open for replay.
#[derive(Debug, Clone, Default)]
pub enum RecordingSelector {
    /// Highest index in the store directory.
    #[default]
    Latest,
    /// Explicit file — bare name inside the store directory, or a path.
    Named(String),
}

/// Resolve a selector and open a read-only cursor over its records.
pub fn open_recording(
    dir: &Path,
    base: &str,
    selector: RecordingSelector,
) -> Result<RecordingCursor, CadenceError> {
    let path = match selector {
        RecordingSelector::Named(name) => {
            let direct = PathBuf::from(&name);
            let path = if direct.is_file() { direct } else { dir.join(&name) };
            if !path.is_file() {
                return Err(CadenceError::RecordingNotFound(name));
            }
            path
        }
        RecordingSelector::Latest => match scan_recordings(dir, base)?.into_iter().next() {
            Some((_, path)) => path,
            None => {
                return Err(CadenceError::RecordingNotFound(format!(
                    "no recordings in {}",
                    dir.display()
                )));
            }
        },
    };
    RecordingCursor::open(path)
}

/// Lazy, ordered, line-by-line reader over one recording file.
///
/// The whole file is never resident in memory; each `next()` reads one
/// line. Malformed lines surface as `MalformedRecord` items so the caller
/// can warn and continue.
#[derive(Debug)]
pub struct RecordingCursor {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl RecordingCursor {
    fn open(path: PathBuf) -> Result<Self, CadenceError> {
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CadenceError::RecordingNotFound(path.display().to_string()),
            _ => CadenceError::Io(e),
        })?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for RecordingCursor {
    type Item = Result<MessageRecord, CadenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(e) => return Some(Err(CadenceError::Io(e))),
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let parsed = match serde_json::from_str::<MessageRecord>(trimmed) {
                Ok(record) => record,
                Err(e) => {
                    return Some(Err(CadenceError::MalformedRecord {
                        line: self.line_no,
                        detail: e.to_string(),
                    }));
                }
            };
            if parsed.topic.is_empty() {
                return Some(Err(CadenceError::MalformedRecord {
                    line: self.line_no,
                    detail: "empty topic".into(),
                }));
            }
            if !parsed.timestamp.is_finite() {
                return Some(Err(CadenceError::MalformedRecord {
                    line: self.line_no,
                    detail: "non-finite timestamp".into(),
                }));
            }
            return Some(Ok(parsed));
        }
    }
}
