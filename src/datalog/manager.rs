//! # Log Lifecycle Manager
//!
//! Owns the open log file and everything whose validity is tied to it.
//!
//! This module handles:
//! - Lazy per-channel entry registration (one cache for scalars and arrays,
//!   one for structs) and struct schema publication
//! - Count- and time-triggered flush batching
//! - Age-based rotation driven by a 1 Hz tick on a blocking-pool thread
//! - Timestamped, collision-free file naming
//!
//! All state lives behind one lock. Writer failures are logged and
//! swallowed so a bad disk never stalls the pipeline.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{Local, TimeZone};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::writer::{type_tag, EntryHandle, EntryValue, LogWriter, WriterFactory, SCHEMA_ENTRY_PREFIX};
use crate::clock::Clock;
use crate::config::LogConfig;
use crate::error::Result;
use crate::structs::{StructSchema, StructValue, StructValues};

/// How often the rotation task wakes up
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// `<prefix><yyyyMMdd_HHmmss>.<ext>` for the given wall time (local zone).
pub fn timestamped_file_name(prefix: &str, wall_ms: i64, extension: &str) -> String {
    let stamp = Local
        .timestamp_millis_opt(wall_ms)
        .earliest()
        .map(|time| time.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| wall_ms.to_string());
    format!("{}{}.{}", prefix, stamp, extension)
}

struct LogState {
    writer: Option<Box<dyn LogWriter>>,
    current_path: Option<PathBuf>,
    file_start_ms: i64,
    scalar_handles: HashMap<String, EntryHandle>,
    struct_handles: HashMap<String, EntryHandle>,
    published_schemas: HashSet<&'static str>,
    writes_since_flush: u64,
    last_flush_ms: i64,
    stopped: bool,
}

impl LogState {
    fn new() -> Self {
        Self {
            writer: None,
            current_path: None,
            file_start_ms: 0,
            scalar_handles: HashMap::new(),
            struct_handles: HashMap::new(),
            published_schemas: HashSet::new(),
            writes_since_flush: 0,
            last_flush_ms: 0,
            stopped: false,
        }
    }
}

/// Rotating, batched-flush front end to a [`LogWriter`].
pub struct LogManager {
    log_dir: PathBuf,
    file_prefix: String,
    file_extension: String,
    max_file_age_ms: i64,
    flush_entry_threshold: u64,
    flush_time_threshold_ms: i64,
    factory: Arc<dyn WriterFactory>,
    clock: Arc<dyn Clock>,
    state: Mutex<LogState>,
    shutdown: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager")
            .field("log_dir", &self.log_dir)
            .field("current_path", &self.current_path())
            .finish_non_exhaustive()
    }
}

impl LogManager {
    pub fn new(config: &LogConfig, factory: Arc<dyn WriterFactory>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            log_dir: PathBuf::from(&config.log_dir),
            file_prefix: config.file_prefix.clone(),
            file_extension: config.file_extension.clone(),
            max_file_age_ms: config.max_file_age_ms as i64,
            flush_entry_threshold: config.flush_entry_threshold.max(1),
            flush_time_threshold_ms: config.flush_time_threshold_ms as i64,
            factory,
            clock,
            state: Mutex::new(LogState::new()),
            shutdown,
            ticker: Mutex::new(None),
        }
    }

    /// Open the first log file.
    ///
    /// # Errors
    ///
    /// Returns the directory or writer error. The rotation tick keeps
    /// retrying, so the caller may treat this as non-fatal.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.stopped || state.writer.is_some() {
            return Ok(());
        }
        self.open_locked(&mut state)
    }

    /// Open the first file (if not yet open) and spawn the rotation task on
    /// the blocking pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) {
        if let Err(e) = self.open() {
            error!("Failed to open log file in {}: {}", self.log_dir.display(), e);
        }

        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }
        let manager = Arc::downgrade(self);
        let shutdown = self.shutdown.subscribe();
        *ticker = Some(tokio::task::spawn_blocking(move || run_ticker(manager, shutdown)));
    }

    /// Flush and close the current file and stop the rotation task.
    ///
    /// Idempotent. Writes after this are discarded.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);

        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        Self::close_locked(&mut state);
        info!("Log manager stopped");
    }

    /// Wait for the rotation task to exit after [`stop`](Self::stop).
    pub async fn join(&self) {
        let handle = self.ticker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Log rotation task failed: {}", e);
            }
        }
    }

    /// One rotation-task step: retry a failed open, rotate an expired file,
    /// or flush writes that have waited past the time threshold.
    pub fn tick(&self) {
        let now = self.clock.wall_millis();
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }

        if state.writer.is_none() {
            if let Err(e) = self.open_locked(&mut state) {
                warn!("Retrying log file open failed: {}", e);
            }
            return;
        }

        if now - state.file_start_ms >= self.max_file_age_ms {
            self.rotate_locked(&mut state);
        } else if state.writes_since_flush > 0
            && now - state.last_flush_ms >= self.flush_time_threshold_ms
        {
            Self::flush_locked(&mut state, now);
        }
    }

    /// Rotate if the current file has reached its maximum age.
    pub fn rotate_if_due(&self) -> bool {
        let now = self.clock.wall_millis();
        let mut state = self.state.lock();
        if state.stopped || now - state.file_start_ms < self.max_file_age_ms {
            return false;
        }
        self.rotate_locked(&mut state);
        true
    }

    /// Close the current file and open a new one regardless of age.
    pub fn rotate(&self) {
        let mut state = self.state.lock();
        if !state.stopped {
            self.rotate_locked(&mut state);
        }
    }

    /// Flush now if anything was written since the last flush.
    pub fn flush(&self) {
        let now = self.clock.wall_millis();
        let mut state = self.state.lock();
        if state.writes_since_flush > 0 {
            Self::flush_locked(&mut state, now);
        }
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.state.lock().current_path.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().writer.is_some()
    }

    pub fn writes_since_flush(&self) -> u64 {
        self.state.lock().writes_since_flush
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn log_double(&self, channel: &str, value: f64, timestamp_micros: i64) {
        self.write_entry(channel, type_tag::DOUBLE, EntryValue::Double(value), timestamp_micros);
    }

    pub fn log_integer(&self, channel: &str, value: i64, timestamp_micros: i64) {
        self.write_entry(channel, type_tag::INT64, EntryValue::Integer(value), timestamp_micros);
    }

    pub fn log_boolean(&self, channel: &str, value: bool, timestamp_micros: i64) {
        self.write_entry(channel, type_tag::BOOLEAN, EntryValue::Boolean(value), timestamp_micros);
    }

    pub fn log_string(&self, channel: &str, value: &str, timestamp_micros: i64) {
        self.write_entry(
            channel,
            type_tag::STRING,
            EntryValue::String(value.to_string()),
            timestamp_micros,
        );
    }

    pub fn log_boolean_array(&self, channel: &str, values: &[bool], timestamp_micros: i64) {
        self.write_entry(
            channel,
            type_tag::BOOLEAN_ARRAY,
            EntryValue::BooleanArray(values.to_vec()),
            timestamp_micros,
        );
    }

    pub fn log_integer_array(&self, channel: &str, values: &[i64], timestamp_micros: i64) {
        self.write_entry(
            channel,
            type_tag::INT64_ARRAY,
            EntryValue::IntegerArray(values.to_vec()),
            timestamp_micros,
        );
    }

    pub fn log_double_array(&self, channel: &str, values: &[f64], timestamp_micros: i64) {
        self.write_entry(
            channel,
            type_tag::DOUBLE_ARRAY,
            EntryValue::DoubleArray(values.to_vec()),
            timestamp_micros,
        );
    }

    pub fn log_float_array(&self, channel: &str, values: &[f32], timestamp_micros: i64) {
        self.write_entry(
            channel,
            type_tag::FLOAT_ARRAY,
            EntryValue::FloatArray(values.to_vec()),
            timestamp_micros,
        );
    }

    pub fn log_raw(&self, channel: &str, bytes: &[u8], timestamp_micros: i64) {
        self.write_entry(channel, type_tag::RAW, EntryValue::Raw(bytes.to_vec()), timestamp_micros);
    }

    pub fn log_struct(&self, channel: &str, value: &StructValue, timestamp_micros: i64) {
        let schema = value.schema();
        self.write_struct(
            channel,
            schema,
            schema.type_tag(),
            value.to_bytes().to_vec(),
            timestamp_micros,
        );
    }

    pub fn log_struct_array(&self, channel: &str, values: &StructValues, timestamp_micros: i64) {
        let schema = values.schema();
        self.write_struct(
            channel,
            schema,
            schema.array_type_tag(),
            values.to_bytes().to_vec(),
            timestamp_micros,
        );
    }

    fn write_entry(&self, channel: &str, type_tag: &str, value: EntryValue, timestamp_micros: i64) {
        let now = self.clock.wall_millis();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(writer) = state.writer.as_mut() else {
            debug!("No open log file, dropping write to {}", channel);
            return;
        };

        let handle = match lookup_or_start(
            &mut state.scalar_handles,
            writer.as_mut(),
            channel,
            type_tag,
            timestamp_micros,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to register log entry {}: {}", channel, e);
                return;
            }
        };

        if let Err(e) = writer.append(handle, &value, timestamp_micros) {
            warn!("Failed to write {} to log: {}", channel, e);
        }
        self.after_write_locked(state, now);
    }

    fn write_struct(
        &self,
        channel: &str,
        schema: &'static StructSchema,
        type_tag: String,
        bytes: Vec<u8>,
        timestamp_micros: i64,
    ) {
        let now = self.clock.wall_millis();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(writer) = state.writer.as_mut() else {
            debug!("No open log file, dropping write to {}", channel);
            return;
        };

        for dependency in schema.with_dependencies() {
            if state.published_schemas.insert(dependency.type_name) {
                if let Err(e) = publish_schema(writer.as_mut(), dependency, timestamp_micros) {
                    warn!("Failed to publish schema for {}: {}", dependency.type_name, e);
                }
            }
        }

        let handle = match lookup_or_start(
            &mut state.struct_handles,
            writer.as_mut(),
            channel,
            &type_tag,
            timestamp_micros,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to register log entry {}: {}", channel, e);
                return;
            }
        };

        if let Err(e) = writer.append(handle, &EntryValue::Raw(bytes), timestamp_micros) {
            warn!("Failed to write {} to log: {}", channel, e);
        }
        self.after_write_locked(state, now);
    }

    fn after_write_locked(&self, state: &mut LogState, now: i64) {
        state.writes_since_flush += 1;
        if state.writes_since_flush >= self.flush_entry_threshold
            || now - state.last_flush_ms >= self.flush_time_threshold_ms
        {
            Self::flush_locked(state, now);
        }
    }

    fn flush_locked(state: &mut LogState, now: i64) {
        if let Some(writer) = state.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Log flush failed: {}", e);
            }
        }
        state.writes_since_flush = 0;
        state.last_flush_ms = now;
    }

    fn close_locked(state: &mut LogState) {
        if let Some(mut writer) = state.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Log flush before close failed: {}", e);
            }
            if let Err(e) = writer.close() {
                warn!("Log close failed: {}", e);
            }
            if let Some(path) = &state.current_path {
                info!("Closed log file {}", path.display());
            }
        }
        state.current_path = None;
        state.scalar_handles.clear();
        state.struct_handles.clear();
        state.published_schemas.clear();
        state.writes_since_flush = 0;
    }

    fn rotate_locked(&self, state: &mut LogState) {
        Self::close_locked(state);
        if let Err(e) = self.open_locked(state) {
            error!("Failed to open rotated log file: {}", e);
        }
    }

    fn open_locked(&self, state: &mut LogState) -> Result<()> {
        let now = self.clock.wall_millis();
        fs::create_dir_all(&self.log_dir)?;
        let path = self.next_path(now);
        let writer = self.factory.create(&path)?;

        info!("Opened log file {}", path.display());
        state.writer = Some(writer);
        state.current_path = Some(path);
        state.file_start_ms = now;
        state.last_flush_ms = now;
        state.writes_since_flush = 0;
        Ok(())
    }

    fn next_path(&self, wall_ms: i64) -> PathBuf {
        let name = timestamped_file_name(&self.file_prefix, wall_ms, &self.file_extension);
        let candidate = self.log_dir.join(&name);
        if !candidate.exists() {
            return candidate;
        }

        let stem = name
            .strip_suffix(&format!(".{}", self.file_extension))
            .unwrap_or(&name)
            .to_string();
        let mut suffix = 1u32;
        loop {
            let candidate = self
                .log_dir
                .join(format!("{}_{}.{}", stem, suffix, self.file_extension));
            if !candidate.exists() {
                return candidate;
            }
            suffix += 1;
        }
    }
}

fn lookup_or_start(
    handles: &mut HashMap<String, EntryHandle>,
    writer: &mut dyn LogWriter,
    channel: &str,
    type_tag: &str,
    timestamp_micros: i64,
) -> Result<EntryHandle> {
    if let Some(handle) = handles.get(channel) {
        return Ok(*handle);
    }
    let handle = writer.start_entry(channel, type_tag, "", timestamp_micros)?;
    handles.insert(channel.to_string(), handle);
    Ok(handle)
}

fn publish_schema(
    writer: &mut dyn LogWriter,
    schema: &StructSchema,
    timestamp_micros: i64,
) -> Result<()> {
    let name = format!("{}{}", SCHEMA_ENTRY_PREFIX, schema.type_tag());
    let handle = writer.start_entry(&name, type_tag::STRUCT_SCHEMA, "", timestamp_micros)?;
    writer.append(
        handle,
        &EntryValue::Raw(schema.schema.as_bytes().to_vec()),
        timestamp_micros,
    )
}

/// Ticks run file I/O under the state lock, so they stay off the runtime
/// workers. Only the wait between ticks is async. Holds the manager weakly;
/// dropping it closes the shutdown channel and ends the loop.
fn run_ticker(manager: Weak<LogManager>, mut shutdown: watch::Receiver<bool>) {
    let runtime = Handle::current();
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    while runtime.block_on(next_tick(&mut interval, &mut shutdown)) {
        match manager.upgrade() {
            Some(manager) => manager.tick(),
            None => break,
        }
    }
    debug!("Log rotation task stopped");
}

/// `true` when a tick is due, `false` once shutdown is requested.
async fn next_tick(interval: &mut Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            _ = interval.tick() => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::datalog::writer::{MockLogWriter, MockWriterFactory};
    use crate::error::TelemetryError;
    use crate::structs::{Pose2d, SwerveModuleState};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Start { name: String, type_tag: String, handle: EntryHandle },
        Append { handle: EntryHandle, value: EntryValue, ts: i64 },
        Flush,
        Close,
    }

    /// In-memory writer that records every call.
    struct RecordingWriter {
        ops: Arc<Mutex<Vec<Op>>>,
        next: u32,
    }

    impl LogWriter for RecordingWriter {
        fn start_entry(
            &mut self,
            name: &str,
            type_tag: &str,
            _metadata: &str,
            _timestamp_micros: i64,
        ) -> Result<EntryHandle> {
            self.next += 1;
            let handle = EntryHandle(self.next);
            self.ops.lock().push(Op::Start {
                name: name.to_string(),
                type_tag: type_tag.to_string(),
                handle,
            });
            Ok(handle)
        }

        fn append(&mut self, handle: EntryHandle, value: &EntryValue, ts: i64) -> Result<()> {
            self.ops.lock().push(Op::Append {
                handle,
                value: value.clone(),
                ts,
            });
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.ops.lock().push(Op::Flush);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.ops.lock().push(Op::Close);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        ops: Arc<Mutex<Vec<Op>>>,
        paths: Mutex<Vec<PathBuf>>,
    }

    impl WriterFactory for RecordingFactory {
        fn create(&self, path: &Path) -> Result<Box<dyn LogWriter>> {
            self.paths.lock().push(path.to_path_buf());
            Ok(Box::new(RecordingWriter {
                ops: Arc::clone(&self.ops),
                next: 0,
            }))
        }
    }

    struct Fixture {
        _dir: TempDir,
        clock: Arc<ManualClock>,
        factory: Arc<RecordingFactory>,
        manager: LogManager,
    }

    impl Fixture {
        fn ops(&self) -> Vec<Op> {
            self.factory.ops.lock().clone()
        }

        fn count(&self, wanted: &Op) -> usize {
            self.ops().iter().filter(|op| *op == wanted).count()
        }

        fn starts_named(&self, name: &str) -> usize {
            self.ops()
                .iter()
                .filter(|op| matches!(op, Op::Start { name: n, .. } if n == name))
                .count()
        }
    }

    fn log_config(dir: &Path) -> LogConfig {
        LogConfig {
            log_dir: dir.to_string_lossy().into_owned(),
            file_prefix: "udp_".to_string(),
            file_extension: "jsonl".to_string(),
            max_file_age_ms: 300_000,
            flush_entry_threshold: 200,
            flush_time_threshold_ms: 500,
        }
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let factory = Arc::new(RecordingFactory::default());
        let manager = LogManager::new(&log_config(dir.path()), factory.clone(), clock.clone());
        manager.open().unwrap();
        Fixture {
            _dir: dir,
            clock,
            factory,
            manager,
        }
    }

    #[test]
    fn test_flush_once_per_entry_threshold() {
        let f = fixture();
        for i in 0..399 {
            f.manager.log_double("RIO/Voltage", 12.0, i);
        }
        assert_eq!(f.count(&Op::Flush), 1);
        assert_eq!(f.manager.writes_since_flush(), 199);

        f.manager.log_double("RIO/Voltage", 12.0, 399);
        assert_eq!(f.count(&Op::Flush), 2);
        assert_eq!(f.manager.writes_since_flush(), 0);
    }

    #[test]
    fn test_time_threshold_flushes_slow_writers() {
        let f = fixture();
        f.manager.log_integer("Count", 1, 0);
        assert_eq!(f.count(&Op::Flush), 0);

        f.clock.advance_millis(499);
        f.manager.log_integer("Count", 2, 1);
        assert_eq!(f.count(&Op::Flush), 0);

        f.clock.advance_millis(1);
        f.manager.log_integer("Count", 3, 2);
        assert_eq!(f.count(&Op::Flush), 1);
    }

    #[test]
    fn test_tick_flushes_pending_writes_after_time_threshold() {
        let f = fixture();
        f.manager.log_boolean("Enabled", true, 0);

        f.clock.advance_millis(100);
        f.manager.tick();
        assert_eq!(f.count(&Op::Flush), 0);

        f.clock.advance_millis(400);
        f.manager.tick();
        assert_eq!(f.count(&Op::Flush), 1);

        // Nothing pending, nothing to flush
        f.clock.advance_millis(1_000);
        f.manager.tick();
        assert_eq!(f.count(&Op::Flush), 1);
    }

    #[test]
    fn test_handles_are_cached_per_channel() {
        let f = fixture();
        f.manager.log_double("A", 1.0, 0);
        f.manager.log_double("A", 2.0, 1);
        f.manager.log_double("B", 3.0, 2);

        assert_eq!(f.starts_named("A"), 1);
        assert_eq!(f.starts_named("B"), 1);
    }

    #[test]
    fn test_rotation_reregisters_handles() {
        let f = fixture();
        f.manager.log_double("A", 1.0, 0);
        assert!(!f.manager.rotate_if_due());

        f.clock.advance_millis(300_000);
        f.manager.tick();
        f.manager.log_double("A", 2.0, 1);

        assert_eq!(f.starts_named("A"), 2);
        assert_eq!(f.count(&Op::Close), 1);
        assert_eq!(f.factory.paths.lock().len(), 2);

        // Flush precedes close
        let ops = f.ops();
        let close = ops.iter().position(|op| *op == Op::Close).unwrap();
        assert_eq!(ops[close - 1], Op::Flush);
    }

    #[test]
    fn test_rotate_if_due_respects_age() {
        let f = fixture();
        f.clock.advance_millis(299_999);
        assert!(!f.manager.rotate_if_due());
        f.clock.advance_millis(1);
        assert!(f.manager.rotate_if_due());
        assert!(f.manager.is_open());
    }

    #[test]
    fn test_timestamps_reach_writer_unscaled() {
        let f = fixture();
        f.manager.log_double("A", 1.0, 1_832_903_929);
        assert!(f.ops().contains(&Op::Append {
            handle: EntryHandle(1),
            value: EntryValue::Double(1.0),
            ts: 1_832_903_929,
        }));
    }

    #[test]
    fn test_struct_schemas_published_once_per_file() {
        let f = fixture();
        let pose = StructValue::Pose2d(Pose2d::new(1.0, 2.0, 0.5));
        f.manager.log_struct("Drive/Pose", &pose, 10);
        f.manager.log_struct("Drive/Pose", &pose, 20);

        assert_eq!(f.starts_named("/.schema/struct:Translation2d"), 1);
        assert_eq!(f.starts_named("/.schema/struct:Rotation2d"), 1);
        assert_eq!(f.starts_named("/.schema/struct:Pose2d"), 1);
        assert!(f.ops().contains(&Op::Start {
            name: "Drive/Pose".to_string(),
            type_tag: "struct:Pose2d".to_string(),
            handle: EntryHandle(4),
        }));
        assert!(f.ops().contains(&Op::Append {
            handle: EntryHandle(3),
            value: EntryValue::Raw(b"Translation2d translation;Rotation2d rotation".to_vec()),
            ts: 10,
        }));

        // Rotation2d is already published; only the new type is added
        let states = StructValues::SwerveModuleStates(vec![SwerveModuleState::default(); 4]);
        f.manager.log_struct_array("Drive/States", &states, 30);
        assert_eq!(f.starts_named("/.schema/struct:Rotation2d"), 1);
        assert_eq!(f.starts_named("/.schema/struct:SwerveModuleState"), 1);

        f.manager.rotate();
        f.manager.log_struct("Drive/Pose", &pose, 40);
        assert_eq!(f.starts_named("/.schema/struct:Pose2d"), 2);
        assert_eq!(f.starts_named("Drive/Pose"), 2);
    }

    #[test]
    fn test_struct_array_entry_type() {
        let f = fixture();
        let states = StructValues::SwerveModuleStates(vec![SwerveModuleState::default(); 2]);
        f.manager.log_struct_array("Drive/States", &states, 0);

        let ops = f.ops();
        let entry = ops
            .iter()
            .find_map(|op| match op {
                Op::Start { name, type_tag, .. } if name == "Drive/States" => Some(type_tag.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(entry, "struct:SwerveModuleState[]");
        assert!(ops.iter().any(|op| matches!(
            op,
            Op::Append { value: EntryValue::Raw(bytes), .. } if bytes.len() == 32
        )));
    }

    #[test]
    fn test_stop_closes_once_and_discards_later_writes() {
        let f = fixture();
        f.manager.log_string("Mode", "auto", 0);
        f.manager.stop();
        f.manager.stop();
        f.manager.log_string("Mode", "teleop", 1);
        f.manager.tick();

        assert_eq!(f.count(&Op::Close), 1);
        assert!(!f.manager.is_open());
        assert_eq!(f.starts_named("Mode"), 1);
        assert_eq!(f.factory.paths.lock().len(), 1);
    }

    #[test]
    fn test_file_name_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let factory = Arc::new(RecordingFactory::default());
        let name = timestamped_file_name("udp_", clock.wall_millis(), "jsonl");
        std::fs::write(dir.path().join(&name), b"").unwrap();

        let manager = LogManager::new(&log_config(dir.path()), factory.clone(), clock);
        manager.open().unwrap();

        let path = manager.current_path().unwrap();
        let expected = format!("{}_1.jsonl", name.trim_end_matches(".jsonl"));
        assert_eq!(path.file_name().unwrap().to_string_lossy(), expected);
    }

    #[test]
    fn test_file_name_format() {
        let name = timestamped_file_name("udp_", 1_700_000_000_000, "jsonl");
        assert!(name.starts_with("udp_"));
        assert!(name.ends_with(".jsonl"));
        // udp_ + yyyyMMdd_HHmmss + .jsonl
        assert_eq!(name.len(), 4 + 15 + 6);
        assert_eq!(&name[12..13], "_");
    }

    #[test]
    fn test_open_failure_is_retried_by_tick() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(0));

        let mut factory = MockWriterFactory::new();
        let mut seq = mockall::Sequence::new();
        factory
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TelemetryError::Writer("disk missing".into())));
        factory
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                let mut writer = MockLogWriter::new();
                writer.expect_flush().returning(|| Ok(()));
                writer.expect_close().returning(|| Ok(()));
                Ok(Box::new(writer))
            });

        let manager = LogManager::new(&log_config(dir.path()), Arc::new(factory), clock);
        assert!(manager.open().is_err());
        assert!(!manager.is_open());

        manager.log_double("A", 1.0, 0);
        manager.tick();
        assert!(manager.is_open());
    }

    #[test]
    fn test_writer_failures_are_swallowed_and_counters_reset() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(0));

        let mut factory = MockWriterFactory::new();
        factory.expect_create().returning(|_| {
            let mut writer = MockLogWriter::new();
            writer.expect_start_entry().returning(|_, _, _, _| Ok(EntryHandle(1)));
            writer
                .expect_append()
                .returning(|_, _, _| Err(TelemetryError::Writer("append failed".into())));
            writer
                .expect_flush()
                .returning(|| Err(TelemetryError::Writer("flush failed".into())));
            writer.expect_close().returning(|| Ok(()));
            Ok(Box::new(writer))
        });

        let mut config = log_config(dir.path());
        config.flush_entry_threshold = 2;
        let manager = LogManager::new(&config, Arc::new(factory), clock);
        manager.open().unwrap();

        manager.log_double("A", 1.0, 0);
        assert_eq!(manager.writes_since_flush(), 1);
        manager.log_double("A", 2.0, 1);
        assert_eq!(manager.writes_since_flush(), 0);
        manager.stop();
    }

    #[tokio::test]
    async fn test_start_and_stop_rotation_task() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let factory = Arc::new(RecordingFactory::default());
        let manager = Arc::new(LogManager::new(&log_config(dir.path()), factory.clone(), clock));

        manager.start();
        manager.start();
        assert!(manager.is_open());

        manager.stop();
        tokio::time::timeout(Duration::from_secs(2), manager.join())
            .await
            .expect("rotation task should exit after stop");
        assert_eq!(factory.paths.lock().len(), 1);
        assert!(factory.ops.lock().contains(&Op::Close));
    }

    #[tokio::test]
    async fn test_rotation_tick_runs_alongside_single_threaded_runtime() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let factory = Arc::new(RecordingFactory::default());
        let manager = Arc::new(LogManager::new(
            &log_config(dir.path()),
            factory.clone(),
            clock.clone(),
        ));

        manager.start();
        clock.advance_millis(300_001);

        tokio::time::timeout(Duration::from_secs(5), async {
            while factory.paths.lock().len() < 2 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("expired file should rotate");

        manager.stop();
        manager.join().await;
        assert_eq!(factory.paths.lock().len(), 2);
    }
}
