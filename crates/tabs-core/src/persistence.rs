use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use super::actions::Operation;
use super::state::SessionState;

pub const SNAPSHOT_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no reducer registered for kind `{kind}`")]
    UnregisteredKind { kind: String },
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

#[derive(Clone, Copy)]
pub struct ReducerIdentity {
    pub name: &'static str,
    pub apply: fn(&SessionState, &Operation) -> SessionState,
}

impl fmt::Debug for ReducerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerIdentity")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub trait OperationStore {
    fn register(&mut self, kind: &str, reducer: ReducerIdentity) -> Result<(), StoreError>;

    fn append(&mut self, kind: &str, path: &str, op: Operation)
        -> Result<SessionState, StoreError>;

    fn get(&self, kind: &str, path: &str) -> Result<SessionState, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub seq: u64,
    pub ts_ms: i64,
    pub kind: String,
    pub path: String,
    pub op: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub kind: String,
    pub path: String,
    pub reducer: String,
    pub state: SessionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u8,
    pub seq: u64,
    pub states: Vec<SnapshotEntry>,
}

pub fn replay_from(
    initial: SessionState,
    records: &[OperationRecord],
    reducer: ReducerIdentity,
) -> SessionState {
    let mut sorted: Vec<&OperationRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.seq);
    sorted
        .into_iter()
        .fold(initial, |state, record| (reducer.apply)(&state, &record.op))
}

#[derive(Debug, Default)]
struct Registry {
    reducers: BTreeMap<String, ReducerIdentity>,
    states: BTreeMap<(String, String), SessionState>,
}

impl Registry {
    fn reducer(&self, kind: &str) -> Result<ReducerIdentity, StoreError> {
        self.reducers
            .get(kind)
            .copied()
            .ok_or_else(|| StoreError::UnregisteredKind {
                kind: kind.to_string(),
            })
    }

    fn current(&self, kind: &str, path: &str) -> Result<SessionState, StoreError> {
        self.reducer(kind)?;
        Ok(self
            .states
            .get(&(kind.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn next_value(
        &self,
        kind: &str,
        path: &str,
        op: &Operation,
    ) -> Result<SessionState, StoreError> {
        let reducer = self.reducer(kind)?;
        let current = self.current(kind, path)?;
        Ok((reducer.apply)(&current, op))
    }

    fn store(&mut self, kind: &str, path: &str, state: SessionState) {
        self.states
            .insert((kind.to_string(), path.to_string()), state);
    }

    // Rebuilds every path of `kind` from `base` plus the records that follow it.
    fn rebuild(
        &mut self,
        kind: &str,
        reducer: ReducerIdentity,
        base: Vec<(String, SessionState)>,
        records: &[OperationRecord],
    ) {
        self.states.retain(|(k, _), _| k != kind);
        for (path, state) in base {
            self.store(kind, &path, state);
        }
        let mut by_path: BTreeMap<String, Vec<OperationRecord>> = BTreeMap::new();
        for record in records.iter().filter(|record| record.kind == kind) {
            by_path
                .entry(record.path.clone())
                .or_default()
                .push(record.clone());
        }
        for (path, path_records) in by_path {
            let initial = self
                .states
                .get(&(kind.to_string(), path.clone()))
                .cloned()
                .unwrap_or_default();
            let state = replay_from(initial, &path_records, reducer);
            self.store(kind, &path, state);
        }
    }

    fn snapshot_entries(&self) -> Vec<SnapshotEntry> {
        self.states
            .iter()
            .filter_map(|((kind, path), state)| {
                self.reducers.get(kind).map(|reducer| SnapshotEntry {
                    kind: kind.clone(),
                    path: path.clone(),
                    reducer: reducer.name.to_string(),
                    state: state.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct JsonlOperationStore {
    path: PathBuf,
    snapshot_path: PathBuf,
    next_seq: u64,
    snapshot_every: u64,
    since_snapshot: u64,
    registry: Registry,
}

impl JsonlOperationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existing = load_records(path.as_path())?;
        let next_seq = existing
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        let snapshot_path = path.with_extension("snapshot.json");
        debug!(path = %path.display(), next_seq, "opened operation log");
        Ok(Self {
            path,
            snapshot_path,
            next_seq,
            snapshot_every: 0,
            since_snapshot: 0,
            registry: Registry::default(),
        })
    }

    pub fn with_snapshot_every(mut self, every: u64) -> Self {
        self.snapshot_every = every;
        self
    }

    pub fn log_path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn load(&self) -> Result<Vec<OperationRecord>, StoreError> {
        Ok(load_records(self.path.as_path())?)
    }

    pub fn load_since(&self, seq_exclusive: u64) -> Result<Vec<OperationRecord>, StoreError> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .filter(|record| record.seq > seq_exclusive)
            .collect())
    }

    pub fn save_snapshot(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(snapshot)?;
        let staging = self.snapshot_path.with_extension("tmp");
        let mut file = File::create(&staging)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        std::fs::rename(&staging, &self.snapshot_path)?;
        Ok(())
    }

    pub fn load_snapshot(&self) -> Result<Option<StoreSnapshot>, StoreError> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.snapshot_path)?;
        let snapshot = match serde_json::from_slice::<StoreSnapshot>(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    path = %self.snapshot_path.display(),
                    error = %err,
                    "ignoring unreadable snapshot; replaying full log"
                );
                return Ok(None);
            }
        };
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                version = snapshot.version,
                "ignoring snapshot with unsupported version"
            );
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    fn maybe_snapshot(&mut self, seq: u64) {
        if self.snapshot_every == 0 {
            return;
        }
        self.since_snapshot = self.since_snapshot.saturating_add(1);
        if self.since_snapshot < self.snapshot_every {
            return;
        }
        let snapshot = StoreSnapshot {
            version: SNAPSHOT_VERSION,
            seq,
            states: self.registry.snapshot_entries(),
        };
        match self.save_snapshot(&snapshot) {
            Ok(()) => {
                self.since_snapshot = 0;
                debug!(seq, "wrote store snapshot");
            }
            // The record itself is durable; the next append retries the snapshot.
            Err(err) => warn!(seq, error = %err, "failed to write store snapshot"),
        }
    }
}

impl OperationStore for JsonlOperationStore {
    fn register(&mut self, kind: &str, reducer: ReducerIdentity) -> Result<(), StoreError> {
        self.registry.reducers.insert(kind.to_string(), reducer);

        let snapshot = self.load_snapshot()?;
        let (base, since) = match snapshot {
            Some(snapshot) => {
                let base = snapshot
                    .states
                    .into_iter()
                    .filter(|entry| entry.kind == kind && entry.reducer == reducer.name)
                    .map(|entry| (entry.path, entry.state))
                    .collect::<Vec<_>>();
                // A snapshot made by another reducer is useless: replay everything.
                if base.is_empty() {
                    (Vec::new(), 0)
                } else {
                    (base, snapshot.seq)
                }
            }
            None => (Vec::new(), 0),
        };
        let records = self.load_since(since)?;
        self.registry.rebuild(kind, reducer, base, &records);
        debug!(kind, reducer = reducer.name, replayed = records.len(), "registered reducer");
        Ok(())
    }

    fn append(
        &mut self,
        kind: &str,
        path: &str,
        op: Operation,
    ) -> Result<SessionState, StoreError> {
        let next = self.registry.next_value(kind, path, &op)?;
        let seq = self.next_seq;
        let record = OperationRecord {
            seq,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            kind: kind.to_string(),
            path: path.to_string(),
            op,
        };
        let line = serde_json::to_string(&record)?;
        append_line(self.path.as_path(), line.as_str())?;
        self.next_seq = self.next_seq.saturating_add(1);
        self.registry.store(kind, path, next.clone());
        self.maybe_snapshot(seq);
        Ok(next)
    }

    fn get(&self, kind: &str, path: &str) -> Result<SessionState, StoreError> {
        self.registry.current(kind, path)
    }
}

#[derive(Debug, Default)]
pub struct MemoryOperationStore {
    records: Vec<OperationRecord>,
    registry: Registry,
    unavailable: Option<String>,
}

impl MemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&mut self, reason: Option<&str>) {
        self.unavailable = reason.map(str::to_string);
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }
}

impl OperationStore for MemoryOperationStore {
    fn register(&mut self, kind: &str, reducer: ReducerIdentity) -> Result<(), StoreError> {
        self.registry.reducers.insert(kind.to_string(), reducer);
        self.registry
            .rebuild(kind, reducer, Vec::new(), &self.records);
        Ok(())
    }

    fn append(
        &mut self,
        kind: &str,
        path: &str,
        op: Operation,
    ) -> Result<SessionState, StoreError> {
        if let Some(reason) = &self.unavailable {
            return Err(StoreError::Unavailable {
                reason: reason.clone(),
            });
        }
        let next = self.registry.next_value(kind, path, &op)?;
        let seq = self
            .records
            .last()
            .map_or(1, |record| record.seq.saturating_add(1));
        self.records.push(OperationRecord {
            seq,
            ts_ms: 0,
            kind: kind.to_string(),
            path: path.to_string(),
            op,
        });
        self.registry.store(kind, path, next.clone());
        Ok(next)
    }

    fn get(&self, kind: &str, path: &str) -> Result<SessionState, StoreError> {
        if let Some(reason) = &self.unavailable {
            return Err(StoreError::Unavailable {
                reason: reason.clone(),
            });
        }
        self.registry.current(kind, path)
    }
}

pub fn load_records(path: &Path) -> std::io::Result<Vec<OperationRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OperationRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => debug!(error = %err, "skipping unparseable log line"),
        }
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).read(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    let len = file.metadata()?.len();
    let torn = len > 0 && !ends_with_newline(&mut file, len)?;
    let result = write_line(&mut file, line, torn);
    if result.is_err() {
        // Drop any partial record so the next append starts on a clean line.
        if let Err(err) = file.set_len(len) {
            warn!(error = %err, "failed to roll back partial log write");
        }
    }
    result
}

fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

// One write per record. A torn tail left by an earlier crash is terminated
// first so the new record lands on its own line.
fn write_line<W: Write>(writer: &mut W, line: &str, torn: bool) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(line.len() + 2);
    if torn {
        buf.push(b'\n');
    }
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    writer.write_all(&buf)?;
    writer.flush()
}
