//! JSON-lines output with rotation and atomic tmp→rename

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use papercrawl_core::{Sink, SinkError};
use serde::Serialize;

use crate::paper::Paper;

pub const DEFAULT_MAX_RECORDS_PER_FILE: usize = 50;

/// Open output file, written as `{final}.tmp` until closed
struct OpenFile {
    writer: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    records: usize,
}

impl OpenFile {
    fn create(final_path: PathBuf) -> io::Result<Self> {
        let mut tmp = final_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }
        let writer = BufWriter::new(File::create(&tmp_path)?);
        Ok(Self {
            writer,
            tmp_path,
            final_path,
            records: 0,
        })
    }

    fn close(mut self) -> io::Result<PathBuf> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(self.final_path)
    }
}

#[derive(Default)]
struct State {
    current: Option<OpenFile>,
    next_index: usize,
    written: Vec<PathBuf>,
    total: usize,
}

/// Files produced by a finished [`JsonlSink`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageSummary {
    pub files: Vec<PathBuf>,
    pub records: usize,
}

/// Writes one JSON object per line, rolling to a new file every
/// `max_records_per_file` records.
///
/// Files are named `{prefix}_{index:04}.jsonl`. A file only appears under its
/// final name once it is full or the sink is finalized.
pub struct JsonlSink {
    output_dir: PathBuf,
    prefix: String,
    max_records_per_file: usize,
    state: Mutex<State>,
}

impl std::fmt::Debug for JsonlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink")
            .field("output_dir", &self.output_dir)
            .field("prefix", &self.prefix)
            .field("max_records_per_file", &self.max_records_per_file)
            .finish_non_exhaustive()
    }
}

impl JsonlSink {
    /// Create the output directory and drop stale tmp files left by a crashed run.
    pub fn create(
        output_dir: &Path,
        prefix: impl Into<String>,
        max_records_per_file: usize,
    ) -> anyhow::Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        cleanup_tmp_files(output_dir)
            .with_context(|| format!("Failed to clean {}", output_dir.display()))?;

        let prefix = prefix.into();
        let next_index = next_free_index(output_dir, &prefix)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            prefix,
            max_records_per_file: max_records_per_file.max(1),
            state: Mutex::new(State {
                next_index,
                ..State::default()
            }),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Records written so far, including those in the open file
    pub fn record_count(&self) -> usize {
        self.lock().total
    }

    /// Serialize and append one record, rotating when the file is full.
    pub fn write<T: Serialize>(&self, record: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');

        let mut guard = self.lock();
        let state = &mut *guard;
        let file = match &mut state.current {
            Some(file) => file,
            slot @ None => {
                let path = self
                    .output_dir
                    .join(format!("{}_{:04}.jsonl", self.prefix, state.next_index));
                state.next_index += 1;
                slot.insert(OpenFile::create(path)?)
            }
        };
        file.writer.write_all(&line)?;
        file.records += 1;
        let full = file.records >= self.max_records_per_file;
        state.total += 1;

        if full {
            self.rotate(state)?;
        }
        Ok(())
    }

    fn rotate(&self, state: &mut State) -> io::Result<()> {
        if let Some(file) = state.current.take() {
            let records = file.records;
            let path = file.close()?;
            log::debug!("Wrote {} ({records} records)", path.display());
            state.written.push(path);
        }
        Ok(())
    }

    /// Close the open file and return everything written.
    pub fn finalize(&self) -> io::Result<StorageSummary> {
        let mut state = self.lock();
        self.rotate(&mut state)?;
        log::info!(
            "Stored {} records in {} files under {}",
            state.total,
            state.written.len(),
            self.output_dir.display()
        );
        Ok(StorageSummary {
            files: state.written.clone(),
            records: state.total,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sink<Paper> for JsonlSink {
    fn deliver(&self, record: &Paper) -> Result<(), SinkError> {
        self.write(record).map_err(SinkError::from)
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

/// First index not used by an existing `{prefix}_NNNN.jsonl`, so reruns append.
fn next_free_index(output_dir: &Path, prefix: &str) -> anyhow::Result<usize> {
    let mut next = 0;
    for entry in fs::read_dir(output_dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let index = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix(".jsonl"))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(i) = index {
            next = next.max(i + 1);
        }
    }
    Ok(next)
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
