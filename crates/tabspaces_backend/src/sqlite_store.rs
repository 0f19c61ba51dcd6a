use crate::time::unix_epoch_seconds_now;
use anyhow::{Context as _, anyhow};
use rusqlite::{Connection, OptionalExtension as _, params};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tabspaces_domain::{KeyValueStore, StoreBatch};

const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/0001_init.sql")),
)];

/// Key-value store backed by one sqlite file. All access goes through a
/// dedicated worker thread.
#[derive(Clone)]
pub struct SqliteStore {
    tx: mpsc::Sender<DbCommand>,
}

enum DbCommand {
    Get {
        key: String,
        reply: mpsc::Sender<anyhow::Result<Option<Value>>>,
    },
    Write {
        batch: StoreBatch,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
}

impl SqliteStore {
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<DbCommand>();

        std::thread::Builder::new()
            .name("tabspaces-sqlite".to_owned())
            .spawn(move || {
                let mut db = SqliteDatabase::open(&db_path);
                if let Err(err) = &db {
                    tracing::error!(path = %db_path.display(), error = %format!("{err:#}"), "failed to open sqlite store");
                }
                while let Ok(cmd) = rx.recv() {
                    match (&mut db, cmd) {
                        (Ok(db), DbCommand::Get { key, reply }) => {
                            let _ = reply.send(db.get(&key));
                        }
                        (Ok(db), DbCommand::Write { batch, reply }) => {
                            let _ = reply.send(db.write(&batch));
                        }
                        (Err(err), cmd) => respond_db_open_error(err, cmd),
                    }
                }
            })
            .context("failed to spawn sqlite worker thread")?;

        Ok(Self { tx })
    }

    pub fn get_value(&self, key: impl Into<String>) -> anyhow::Result<Option<Value>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::Get {
                key: key.into(),
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn write_batch(&self, batch: StoreBatch) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::Write {
                batch,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, String> {
        self.get_value(key).map_err(|err| format!("{err:#}"))
    }

    fn write(&self, batch: StoreBatch) -> Result<(), String> {
        if batch.is_empty() {
            return Ok(());
        }
        self.write_batch(batch).map_err(|err| format!("{err:#}"))
    }
}

fn respond_db_open_error(err: &anyhow::Error, cmd: DbCommand) {
    let message = format!("{err:#}");
    match cmd {
        DbCommand::Get { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::Write { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
    }
}

struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut conn = Connection::open(db_path)
            .with_context(|| format!("failed to open sqlite db {}", db_path.display()))?;

        configure_connection(&mut conn).context("failed to configure sqlite connection")?;
        apply_migrations(&mut conn).context("failed to apply sqlite migrations")?;

        Ok(Self { conn })
    }

    fn get(&mut self, key: &str) -> anyhow::Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("failed to read key {key}"))?;
        raw.map(|raw| {
            serde_json::from_str(&raw).with_context(|| format!("stored value for {key} is not json"))
        })
        .transpose()
    }

    fn write(&mut self, batch: &StoreBatch) -> anyhow::Result<()> {
        let now = unix_epoch_seconds_now();
        let tx = self.conn.transaction()?;
        for key in &batch.remove {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        }
        for (key, value) in &batch.set {
            let raw = serde_json::to_string(value)
                .with_context(|| format!("failed to encode value for {key}"))?;
            tx.execute(
                "INSERT INTO kv (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, raw, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn configure_connection(conn: &mut Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("failed to apply sqlite PRAGMAs")?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    let current: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .context("failed to read user_version")? as u32;

    if current > LATEST_SCHEMA_VERSION {
        return Err(anyhow!(
            "sqlite schema version is newer than this build: db={}, app={}",
            current,
            LATEST_SCHEMA_VERSION
        ));
    }

    if current == LATEST_SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch("BEGIN IMMEDIATE;")
        .context("failed to begin migration transaction")?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration v{version:04}"))?;
        conn.pragma_update(None, "user_version", *version as i64)
            .context("failed to update user_version")?;
    }

    conn.execute_batch("COMMIT;")
        .context("failed to commit migration transaction")?;
    Ok(())
}
