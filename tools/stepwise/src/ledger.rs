use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use crate::errors::GuideError;
use crate::logging::append_run_log;
use crate::types::Step;

const READ_POOL_SIZE: usize = 2;
pub const STEPS_SLOT: &str = "steps";
pub const DEFAULT_MAX_SLOT_BYTES: usize = 10 * 1024 * 1024;

type StoreResult<T> = Result<T, GuideError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOptions {
    pub max_slot_bytes: usize,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            max_slot_bytes: DEFAULT_MAX_SLOT_BYTES,
        }
    }
}

#[derive(Debug)]
enum WriteCmd {
    Clear {
        reply: oneshot::Sender<StoreResult<()>>,
    },
    Append {
        step: Step,
        reply: oneshot::Sender<StoreResult<usize>>,
    },
    UpdateTitle {
        index: usize,
        title: String,
        reply: oneshot::Sender<StoreResult<()>>,
    },
    UpdateDescription {
        index: usize,
        description: String,
        reply: oneshot::Sender<StoreResult<()>>,
    },
    Delete {
        index: usize,
        reply: oneshot::Sender<StoreResult<Step>>,
    },
    Move {
        from: usize,
        to: usize,
        reply: oneshot::Sender<StoreResult<()>>,
    },
}

/// Owner of the guide's ordered step list.
///
/// Every mutation is a message to one writer thread, which runs it as a
/// single read-modify-write transaction over the `steps` slot. Two mutations
/// therefore never interleave, whichever thread or surface issued them.
/// Reads go through a small pool of read-only connections.
pub struct StepLedger {
    write_tx: Option<mpsc::Sender<WriteCmd>>,
    read_pool: ReadPool,
    writer_join: Option<thread::JoinHandle<()>>,
    db_path: PathBuf,
}

impl Drop for StepLedger {
    fn drop(&mut self) {
        // Close the sender first so the writer loop exits.
        drop(self.write_tx.take());
        if let Some(handle) = self.writer_join.take() {
            let _ = handle.join();
        }
    }
}

impl StepLedger {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, LedgerOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: LedgerOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        append_run_log(
            "info",
            "ledger.open",
            json!({
                "path": path.display().to_string(),
                "max_slot_bytes": options.max_slot_bytes,
            }),
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GuideError::Database(e.to_string()))?;
        }

        let existed_before_open = path.exists();

        // A zero-byte file is a leftover from a crashed create, not a database.
        if existed_before_open {
            let meta =
                std::fs::metadata(&path).map_err(|e| GuideError::Database(e.to_string()))?;
            if meta.len() == 0 {
                return Err(GuideError::Database(format!(
                    "guide database is 0 bytes (corrupt): {}",
                    path.display()
                )));
            }
        }

        let mut write_conn = Connection::open(&path).map_err(db_err)?;
        configure_write_connection(&write_conn)?;

        if existed_before_open {
            let integrity: String = write_conn
                .pragma_query_value(None, "quick_check", |row| row.get(0))
                .map_err(db_err)?;
            if integrity != "ok" {
                return Err(GuideError::Database(format!(
                    "guide database failed integrity check: {integrity}"
                )));
            }
        }

        run_migrations(&mut write_conn)?;

        let max_slot_bytes = options.max_slot_bytes;
        let (write_tx, mut write_rx) = mpsc::channel(64);
        let writer_join = thread::spawn(move || {
            while let Some(cmd) = write_rx.blocking_recv() {
                match cmd {
                    WriteCmd::Clear { reply } => {
                        let result = reset_slot(&mut write_conn, max_slot_bytes);
                        let _ = reply.send(result);
                    }
                    WriteCmd::Append { step, reply } => {
                        let result = mutate_slot(&mut write_conn, max_slot_bytes, |steps| {
                            steps.push(step);
                            Ok(steps.len() - 1)
                        });
                        let _ = reply.send(result);
                    }
                    WriteCmd::UpdateTitle {
                        index,
                        title,
                        reply,
                    } => {
                        let result = mutate_slot(&mut write_conn, max_slot_bytes, |steps| {
                            step_at(steps, index)?.title = title;
                            Ok(())
                        });
                        let _ = reply.send(result);
                    }
                    WriteCmd::UpdateDescription {
                        index,
                        description,
                        reply,
                    } => {
                        let result = mutate_slot(&mut write_conn, max_slot_bytes, |steps| {
                            step_at(steps, index)?.description = description;
                            Ok(())
                        });
                        let _ = reply.send(result);
                    }
                    WriteCmd::Delete { index, reply } => {
                        let result = mutate_slot(&mut write_conn, max_slot_bytes, |steps| {
                            remove_item(steps, index)
                        });
                        let _ = reply.send(result);
                    }
                    WriteCmd::Move { from, to, reply } => {
                        let result = mutate_slot(&mut write_conn, max_slot_bytes, |steps| {
                            move_item(steps, from, to)
                        });
                        let _ = reply.send(result);
                    }
                }
            }
        });

        let read_pool = ReadPool::open(&path, READ_POOL_SIZE)?;
        let ledger = Self {
            write_tx: Some(write_tx),
            read_pool,
            writer_join: Some(writer_join),
            db_path: path.clone(),
        };

        append_run_log(
            "info",
            "ledger.opened",
            json!({
                "path": path.display().to_string(),
                "steps": ledger.len().ok(),
            }),
        );
        Ok(ledger)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Reset the guide to an empty sequence. Called when recording starts.
    pub fn clear(&self) -> StoreResult<()> {
        let result = self.request(|reply| WriteCmd::Clear { reply });
        log_outcome("ledger.cleared", json!({}), &result);
        result
    }

    /// Append at the end; returns the new step's index.
    pub fn append(&self, step: Step) -> StoreResult<usize> {
        let title = step.title.clone();
        let result = self.request(|reply| WriteCmd::Append { step, reply });
        match &result {
            Ok(index) => append_run_log(
                "info",
                "ledger.step.appended",
                json!({ "index": index, "title": title }),
            ),
            Err(e) => append_run_log(
                "error",
                "ledger.step.append_failed",
                json!({ "title": title, "error": e.to_string() }),
            ),
        }
        result
    }

    pub fn update_title(&self, index: usize, title: impl Into<String>) -> StoreResult<()> {
        let title = title.into();
        let result = self.request(|reply| WriteCmd::UpdateTitle {
            index,
            title,
            reply,
        });
        log_outcome("ledger.step.title_updated", json!({ "index": index }), &result);
        result
    }

    pub fn update_description(
        &self,
        index: usize,
        description: impl Into<String>,
    ) -> StoreResult<()> {
        let description = description.into();
        let result = self.request(|reply| WriteCmd::UpdateDescription {
            index,
            description,
            reply,
        });
        log_outcome(
            "ledger.step.description_updated",
            json!({ "index": index }),
            &result,
        );
        result
    }

    /// Remove the step at `index`. Callers must confirm with the user first.
    pub fn delete(&self, index: usize) -> StoreResult<Step> {
        let result = self.request(|reply| WriteCmd::Delete { index, reply });
        log_outcome("ledger.step.deleted", json!({ "index": index }), &result);
        result
    }

    /// Splice the step at `from` out and back in at `to`.
    pub fn move_step(&self, from: usize, to: usize) -> StoreResult<()> {
        let result = self.request(|reply| WriteCmd::Move { from, to, reply });
        log_outcome(
            "ledger.step.moved",
            json!({ "from": from, "to": to }),
            &result,
        );
        result
    }

    pub fn list_steps(&self) -> StoreResult<Vec<Step>> {
        self.read_pool.with_conn(read_slot)
    }

    pub fn get(&self, index: usize) -> StoreResult<Step> {
        let mut steps = self.list_steps()?;
        let len = steps.len();
        if index >= len {
            return Err(GuideError::OutOfRange { index, len });
        }
        Ok(steps.swap_remove(index))
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.list_steps().map(|steps| steps.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.len().map(|len| len == 0)
    }

    fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StoreResult<T>>) -> WriteCmd,
    ) -> StoreResult<T> {
        let sender = self
            .write_tx
            .as_ref()
            .ok_or_else(|| GuideError::Database("ledger is closed".to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .blocking_send(build(reply_tx))
            .map_err(|e| GuideError::Database(e.to_string()))?;
        reply_rx
            .blocking_recv()
            .map_err(|e| GuideError::Database(e.to_string()))?
    }
}

fn log_outcome<T>(event_type: &str, payload: serde_json::Value, result: &StoreResult<T>) {
    match result {
        Ok(_) => append_run_log("info", event_type, payload),
        Err(e) => append_run_log(
            "warn",
            &format!("{event_type}.rejected"),
            json!({ "request": payload, "error": e.to_string() }),
        ),
    }
}

#[derive(Clone)]
struct ReadPool {
    conns: Arc<Vec<Mutex<Connection>>>,
    next: Arc<AtomicUsize>,
}

impl ReadPool {
    fn open(path: &Path, size: usize) -> StoreResult<Self> {
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .map_err(db_err)?;
            conn.busy_timeout(std::time::Duration::from_secs(3))
                .map_err(db_err)?;
            conns.push(Mutex::new(conn));
        }

        Ok(Self {
            conns: Arc::new(conns),
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        let guard = self.conns[idx]
            .lock()
            .map_err(|_| GuideError::Database("read connection lock poisoned".to_string()))?;
        f(&guard)
    }
}

fn configure_write_connection(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(db_err)?;
    conn.pragma_update(None, "synchronous", "FULL")
        .map_err(db_err)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(db_err)?;
    Ok(())
}

fn run_migrations(conn: &mut Connection) -> StoreResult<()> {
    let migrations = [(1_i64, include_str!("../migrations/0001_guide_slots.sql"))];

    conn.execute_batch("BEGIN IMMEDIATE; CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL); COMMIT;")
        .map_err(db_err)?;

    for (version, sql) in migrations {
        let exists = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE version = ?1 LIMIT 1",
                [version],
                |_| Ok(()),
            )
            .optional()
            .map_err(db_err)?
            .is_some();

        if exists {
            continue;
        }

        let tx = conn.transaction().map_err(db_err)?;
        tx.execute_batch(sql).map_err(db_err)?;
        tx.execute(
            "INSERT INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![version, system_time_unix()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        append_run_log(
            "info",
            "ledger.migration.applied",
            json!({ "version": version }),
        );
    }

    Ok(())
}

/// Read the slot, apply `f`, write the slot back, all in one transaction.
/// If `f` or the write fails nothing is committed.
fn mutate_slot<T>(
    conn: &mut Connection,
    max_slot_bytes: usize,
    f: impl FnOnce(&mut Vec<Step>) -> StoreResult<T>,
) -> StoreResult<T> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(db_err)?;
    let mut steps = read_slot(&tx)?;
    let output = f(&mut steps)?;
    write_slot(&tx, &steps, max_slot_bytes)?;
    tx.commit().map_err(db_err)?;
    Ok(output)
}

/// Overwrite the slot with an empty list. The old value is never decoded, so
/// this also recovers a slot that no longer parses.
fn reset_slot(conn: &mut Connection, max_slot_bytes: usize) -> StoreResult<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(db_err)?;
    write_slot(&tx, &[], max_slot_bytes)?;
    tx.commit().map_err(db_err)
}

fn read_slot(conn: &Connection) -> StoreResult<Vec<Step>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM guide_slots WHERE key = ?1",
            [STEPS_SLOT],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(&raw).map_err(|e| {
            GuideError::Database(format!("slot `{STEPS_SLOT}` is not a step list: {e}"))
        }),
    }
}

fn write_slot(conn: &Connection, steps: &[Step], max_slot_bytes: usize) -> StoreResult<()> {
    let encoded =
        serde_json::to_string(steps).map_err(|e| GuideError::Database(e.to_string()))?;
    if encoded.len() > max_slot_bytes {
        return Err(GuideError::StoreQuota {
            needed: encoded.len(),
            limit: max_slot_bytes,
        });
    }
    conn.execute(
        "INSERT INTO guide_slots (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![STEPS_SLOT, encoded, system_time_unix()],
    )
    .map_err(db_err)?;
    Ok(())
}

fn step_at(steps: &mut [Step], index: usize) -> StoreResult<&mut Step> {
    let len = steps.len();
    steps
        .get_mut(index)
        .ok_or(GuideError::OutOfRange { index, len })
}

pub(crate) fn remove_item<T>(items: &mut Vec<T>, index: usize) -> StoreResult<T> {
    if index >= items.len() {
        return Err(GuideError::OutOfRange {
            index,
            len: items.len(),
        });
    }
    Ok(items.remove(index))
}

/// Remove the item at `from`, then insert it at `to` counted in the
/// shortened sequence. Both indices must be valid for the original sequence.
pub(crate) fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> StoreResult<()> {
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(GuideError::OutOfRange { index, len });
        }
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

fn db_err(error: rusqlite::Error) -> GuideError {
    GuideError::Database(error.to_string())
}

pub fn system_time_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use rusqlite::Connection;
    use tempfile::TempDir;

    use super::{move_item, LedgerOptions, StepLedger, STEPS_SLOT};
    use crate::errors::GuideError;
    use crate::types::{ScreenshotRef, Step};

    fn temp_ledger() -> (StepLedger, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("guide.sqlite");
        (StepLedger::open(&db).expect("open ledger"), dir)
    }

    fn step(title: &str) -> Step {
        Step::captured(title, ScreenshotRef::new("data:image/png;base64,AAAA"))
    }

    fn titles(ledger: &StepLedger) -> Vec<String> {
        ledger
            .list_steps()
            .expect("list")
            .into_iter()
            .map(|step| step.title)
            .collect()
    }

    fn seed(ledger: &StepLedger, names: &[&str]) {
        for name in names {
            ledger.append(step(name)).expect("append");
        }
    }

    #[test]
    fn fresh_ledger_reads_empty_sequence() {
        let (ledger, _dir) = temp_ledger();
        assert!(ledger.list_steps().expect("list").is_empty());
        assert!(ledger.is_empty().expect("empty"));
    }

    #[test]
    fn append_preserves_existing_positions() {
        let (ledger, _dir) = temp_ledger();
        assert_eq!(ledger.append(step("A")).expect("a"), 0);
        assert_eq!(ledger.append(step("B")).expect("b"), 1);
        assert_eq!(ledger.append(step("C")).expect("c"), 2);
        assert_eq!(titles(&ledger), ["A", "B", "C"]);

        let first = ledger.get(0).expect("get");
        assert_eq!(first.description, "");
    }

    #[test]
    fn clear_resets_the_guide() {
        let (ledger, _dir) = temp_ledger();
        seed(&ledger, &["A", "B"]);
        ledger.clear().expect("clear");
        assert!(ledger.list_steps().expect("list").is_empty());
    }

    #[test]
    fn updates_replace_one_field_in_place() {
        let (ledger, _dir) = temp_ledger();
        seed(&ledger, &["A", "B"]);
        ledger.update_title(1, "Renamed").expect("title");
        ledger
            .update_description(1, "Line one\nLine two")
            .expect("description");

        let steps = ledger.list_steps().expect("list");
        assert_eq!(steps[0].title, "A");
        assert_eq!(steps[1].title, "Renamed");
        assert_eq!(steps[1].description, "Line one\nLine two");
        assert_eq!(steps[1].screenshot.as_str(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn updates_reject_invalid_index() {
        let (ledger, _dir) = temp_ledger();
        seed(&ledger, &["A"]);
        let err = ledger.update_title(1, "x").expect_err("out of range");
        assert!(matches!(err, GuideError::OutOfRange { index: 1, len: 1 }));
        let err = ledger.update_description(9, "x").expect_err("out of range");
        assert!(matches!(err, GuideError::OutOfRange { index: 9, len: 1 }));
        assert_eq!(titles(&ledger), ["A"]);
    }

    #[test]
    fn delete_shifts_later_steps() {
        let (ledger, _dir) = temp_ledger();
        seed(&ledger, &["A", "B", "C"]);
        let removed = ledger.delete(1).expect("delete");
        assert_eq!(removed.title, "B");
        assert_eq!(titles(&ledger), ["A", "C"]);
    }

    #[test]
    fn delete_out_of_range_leaves_guide_unchanged() {
        let (ledger, _dir) = temp_ledger();
        seed(&ledger, &["A", "B", "C"]);
        let err = ledger.delete(5).expect_err("out of range");
        assert!(matches!(err, GuideError::OutOfRange { index: 5, len: 3 }));
        assert_eq!(titles(&ledger), ["A", "B", "C"]);
    }

    #[test]
    fn delete_then_append_lands_at_the_end() {
        let (ledger, _dir) = temp_ledger();
        seed(&ledger, &["A", "B", "C"]);
        let removed = ledger.delete(0).expect("delete");
        let index = ledger.append(removed).expect("append");
        assert_eq!(index, 2);
        assert_eq!(titles(&ledger), ["B", "C", "A"]);
    }

    #[test]
    fn move_uses_splice_out_splice_in() {
        let (ledger, _dir) = temp_ledger();
        seed(&ledger, &["step0", "step1", "step2"]);
        ledger.move_step(0, 2).expect("move");
        assert_eq!(titles(&ledger), ["step1", "step2", "step0"]);

        ledger.move_step(2, 0).expect("move back");
        assert_eq!(titles(&ledger), ["step0", "step1", "step2"]);
    }

    #[test]
    fn move_rejects_indices_outside_original_bounds() {
        let (ledger, _dir) = temp_ledger();
        seed(&ledger, &["A", "B"]);
        assert!(matches!(
            ledger.move_step(0, 2),
            Err(GuideError::OutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            ledger.move_step(3, 0),
            Err(GuideError::OutOfRange { index: 3, len: 2 })
        ));
        assert_eq!(titles(&ledger), ["A", "B"]);
    }

    #[test]
    fn move_then_inverse_restores_order_for_all_pairs() {
        let original = (0..5).collect::<Vec<_>>();
        for from in 0..original.len() {
            for to in 0..original.len() {
                let mut items = original.clone();
                move_item(&mut items, from, to).expect("move");
                move_item(&mut items, to, from).expect("inverse");
                assert_eq!(items, original, "move({from}, {to})");
            }
        }
    }

    #[test]
    fn quota_failure_keeps_previous_slot() {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("guide.sqlite");
        let ledger =
            StepLedger::open_with(&db, LedgerOptions { max_slot_bytes: 200 }).expect("open");
        ledger.append(step("small")).expect("fits");

        let big = Step::captured("big", ScreenshotRef::new("x".repeat(500)));
        let err = ledger.append(big).expect_err("quota");
        assert!(matches!(err, GuideError::StoreQuota { limit: 200, .. }));
        assert_eq!(titles(&ledger), ["small"]);
    }

    #[test]
    fn concurrent_appends_are_never_lost() {
        let (ledger, _dir) = temp_ledger();
        let ledger = Arc::new(ledger);
        let mut joins = Vec::new();
        for worker in 0..8 {
            let ledger = Arc::clone(&ledger);
            joins.push(thread::spawn(move || {
                for n in 0..5 {
                    ledger
                        .append(step(&format!("w{worker}-{n}")))
                        .expect("append");
                }
            }));
        }
        for join in joins {
            join.join().expect("join");
        }
        assert_eq!(ledger.len().expect("len"), 40);
    }

    #[test]
    fn drop_flushes_and_reopen_sees_steps() {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("guide.sqlite");
        {
            let ledger = StepLedger::open(&db).expect("open");
            seed(&ledger, &["survives"]);
        }
        let reopened = StepLedger::open(&db).expect("reopen");
        assert_eq!(titles(&reopened), ["survives"]);
        assert!(reopened.db_path().ends_with("guide.sqlite"));
    }

    #[test]
    fn stored_steps_without_description_load_fully_formed() {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("guide.sqlite");
        drop(StepLedger::open(&db).expect("create"));

        let conn = Connection::open(&db).expect("conn");
        conn.execute(
            "INSERT INTO guide_slots (key, value, updated_at) VALUES (?1, ?2, 0)",
            [STEPS_SLOT, r#"[{"title":"legacy","screenshot":"data:,"}]"#],
        )
        .expect("seed legacy slot");
        drop(conn);

        let ledger = StepLedger::open(&db).expect("open");
        let steps = ledger.list_steps().expect("list");
        assert_eq!(steps[0].title, "legacy");
        assert_eq!(steps[0].description, "");
    }

    #[test]
    fn undecodable_slot_opens_and_clear_recovers_it() {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("guide.sqlite");
        {
            let ledger = StepLedger::open(&db).expect("create");
            seed(&ledger, &["kept until corrupted"]);
        }
        let conn = Connection::open(&db).expect("conn");
        conn.execute(
            "UPDATE guide_slots SET value = 'not json' WHERE key = ?1",
            [STEPS_SLOT],
        )
        .expect("corrupt slot");
        drop(conn);

        let ledger = StepLedger::open(&db).expect("open with bad slot");
        let err = ledger.list_steps().expect_err("undecodable");
        assert!(matches!(err, GuideError::Database(msg) if msg.contains("not a step list")));

        ledger.clear().expect("clear");
        assert!(ledger.is_empty().expect("empty"));
        assert_eq!(ledger.append(step("fresh")).expect("append"), 0);
        assert_eq!(titles(&ledger), ["fresh"]);
    }

    #[test]
    fn open_rejects_zero_byte_file() {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("guide.sqlite");
        std::fs::write(&db, b"").expect("create zero-byte file");
        match StepLedger::open(&db) {
            Err(GuideError::Database(msg)) => {
                assert!(msg.contains("0 bytes"), "unexpected message: {msg}");
            }
            Err(e) => panic!("expected Database error, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn open_rejects_corrupt_file() {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("guide.sqlite");
        std::fs::write(&db, b"this is not a sqlite database at all").expect("write garbage");
        match StepLedger::open(&db) {
            Err(GuideError::Database(_)) => {}
            Err(e) => panic!("expected Database error, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
