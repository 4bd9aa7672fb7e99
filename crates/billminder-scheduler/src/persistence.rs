//! SQLite-backed ledger store. Survives restarts; the dispatch log is
//! appended row by row instead of rewriting the whole ledger.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use billminder_core::{
    BillMinderError, DispatchBookkeeping, DispatchLogEntry, LedgerState, LogStatus, Obligation,
    Result,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use crate::store::StateStore;

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn db_err(e: rusqlite::Error) -> BillMinderError {
    BillMinderError::Store(e.to_string())
}

fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    s.parse::<NaiveDateTime>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// SQLite store for obligations, dispatch log, bookkeeping and settings.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open or create the ledger database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BillMinderError::Store(e.to_string()))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Recurring obligations, kept in user order
            CREATE TABLE IF NOT EXISTS obligations (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                amount REAL NOT NULL,
                due_day INTEGER NOT NULL,
                last_settled_at TEXT
            );

            -- Append-only send attempts
            CREATE TABLE IF NOT EXISTS dispatch_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                obligation_id TEXT,
                amount REAL NOT NULL,
                name TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                status TEXT NOT NULL            -- 'success', 'failed'
            );
            CREATE INDEX IF NOT EXISTS idx_dispatch_log_sent_at ON dispatch_log(sent_at);

            -- Single-row bookkeeping
            CREATE TABLE IF NOT EXISTS bookkeeping (
                key INTEGER PRIMARY KEY CHECK (key = 1),
                last_dispatch_date TEXT,
                last_dispatch_recipient TEXT
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
         ",
            )
            .map_err(db_err)
    }

    fn load_obligations(conn: &Connection) -> Result<Vec<Obligation>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, name, amount, due_day, last_settled_at
                 FROM obligations ORDER BY position",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                let last_settled_at = match row.get::<_, Option<String>>(4)? {
                    Some(s) => Some(parse_ts(4, &s)?),
                    None => None,
                };
                Ok(Obligation {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    amount: row.get(2)?,
                    due_day: row.get(3)?,
                    last_settled_at,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn load_log(conn: &Connection) -> Result<Vec<DispatchLogEntry>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, obligation_id, amount, name, sent_at, status
                 FROM dispatch_log ORDER BY seq",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(5)?;
                let status = LogStatus::parse(&status).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        Type::Text,
                        format!("unknown status '{status}'").into(),
                    )
                })?;
                Ok(DispatchLogEntry {
                    id: row.get(0)?,
                    obligation_id: row.get(1)?,
                    amount: row.get(2)?,
                    name: row.get(3)?,
                    sent_at: parse_ts(4, &row.get::<_, String>(4)?)?,
                    status,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn load_bookkeeping(conn: &Connection) -> Result<DispatchBookkeeping> {
        let row = conn
            .query_row(
                "SELECT last_dispatch_date, last_dispatch_recipient FROM bookkeeping WHERE key = 1",
                [],
                |row| {
                    let date = match row.get::<_, Option<String>>(0)? {
                        Some(s) => Some(parse_date(0, &s)?),
                        None => None,
                    };
                    Ok(DispatchBookkeeping {
                        last_dispatch_date: date,
                        last_dispatch_recipient: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;
        Ok(row.unwrap_or_default())
    }

    fn insert_log(conn: &Connection, entry: &DispatchLogEntry) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT OR IGNORE INTO dispatch_log (id, obligation_id, amount, name, sent_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.obligation_id,
                entry.amount,
                entry.name,
                fmt_ts(entry.sent_at),
                entry.status.as_str(),
            ],
        )
    }

    fn write_bookkeeping(conn: &Connection, bk: &DispatchBookkeeping) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT OR REPLACE INTO bookkeeping (key, last_dispatch_date, last_dispatch_recipient)
             VALUES (1, ?1, ?2)",
            params![
                bk.last_dispatch_date.map(|d| d.to_string()),
                bk.last_dispatch_recipient,
            ],
        )
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> Result<LedgerState> {
        let conn = self.conn()?;
        let recipient = conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'recipient'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(LedgerState {
            obligations: Self::load_obligations(&conn)?,
            dispatch_log: Self::load_log(&conn)?,
            bookkeeping: Self::load_bookkeeping(&conn)?,
            recipient,
        })
    }

    fn save(&self, state: &LedgerState) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute("DELETE FROM obligations", []).map_err(db_err)?;
        for (position, ob) in state.obligations.iter().enumerate() {
            tx.execute(
                "INSERT INTO obligations (id, position, name, amount, due_day, last_settled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    ob.id,
                    position as i64,
                    ob.name,
                    ob.amount,
                    ob.due_day,
                    ob.last_settled_at.map(fmt_ts),
                ],
            )
            .map_err(db_err)?;
        }

        tx.execute("DELETE FROM dispatch_log", []).map_err(db_err)?;
        for entry in &state.dispatch_log {
            Self::insert_log(&tx, entry).map_err(db_err)?;
        }

        Self::write_bookkeeping(&tx, &state.bookkeeping).map_err(db_err)?;

        let recipient = match &state.recipient {
            Some(addr) => tx.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES ('recipient', ?1)",
                params![addr],
            ),
            None => tx.execute("DELETE FROM settings WHERE key = 'recipient'", []),
        };
        recipient.map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn append_dispatch(&self, entry: &DispatchLogEntry) -> Result<()> {
        let conn = self.conn()?;
        Self::insert_log(&conn, entry).map_err(db_err)?;
        Ok(())
    }

    fn save_bookkeeping(&self, bookkeeping: &DispatchBookkeeping) -> Result<()> {
        let conn = self.conn()?;
        Self::write_bookkeeping(&conn, bookkeeping).map_err(db_err)?;
        Ok(())
    }
}
