//! SQLite storage backend
//!
//! Terms and triples live in two relational tables:
//!
//! ```text
//! terms(id PK, kind, lexical, lang, datatype, hash, canonical UNIQUE)
//! quads(s, p, o, g)  PRIMARY KEY (s, p, o, g), WITHOUT ROWID
//!                    + one composite index per remaining permutation
//! ```
//!
//! Scans are keyset paginated: each page is an `ORDER BY` over the columns of
//! the chosen permutation, resuming with a row-value comparison against the
//! last key seen. No statement or lock outlives a page.

use super::StorageBackend;
use crate::dictionary::TermId;
use crate::index::Permutation;
use crate::term::{Literal, Term, TermKind};
use crate::triple::{Position, Triple, TriplePattern};
use crate::{Error, Result};
use log::{debug, info};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS terms (
        id INTEGER PRIMARY KEY,
        kind INTEGER NOT NULL,
        lexical TEXT NOT NULL,
        lang TEXT,
        datatype TEXT,
        hash INTEGER NOT NULL,
        canonical TEXT NOT NULL UNIQUE
    );
    CREATE INDEX IF NOT EXISTS idx_terms_hash ON terms(hash);
    CREATE TABLE IF NOT EXISTS quads (
        s INTEGER NOT NULL,
        p INTEGER NOT NULL,
        o INTEGER NOT NULL,
        g INTEGER NOT NULL,
        PRIMARY KEY (s, p, o, g)
    ) WITHOUT ROWID;
";

/// SQLite-based storage backend
pub struct SqliteBackend {
    /// Database connection
    conn: Mutex<Connection>,
}

fn column(position: Position) -> &'static str {
    match position {
        Position::Subject => "s",
        Position::Predicate => "p",
        Position::Object => "o",
        Position::Graph => "g",
    }
}

fn key_columns(perm: Permutation) -> String {
    perm.order().map(column).join(", ")
}

/// WHERE clause and parameters for the bound positions of a pattern.
fn where_clause(pattern: &TriplePattern) -> (Vec<String>, Vec<i64>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for position in Position::ALL {
        if let Some(id) = pattern.get(position) {
            clauses.push(format!("{} = ?", column(position)));
            params.push(id.as_i64());
        }
    }
    (clauses, params)
}

fn render_where(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn row_to_triple(row: &rusqlite::Row<'_>) -> rusqlite::Result<Triple> {
    Ok(Triple::new(
        TermId::from_i64(row.get(0)?),
        TermId::from_i64(row.get(1)?),
        TermId::from_i64(row.get(2)?),
        TermId::from_i64(row.get(3)?),
    ))
}

impl SqliteBackend {
    /// Open or create a SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("failed to open sqlite db: {}", e)))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        info!("opened sqlite store at {}", path.display());

        let backend = Self {
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        Ok(backend)
    }

    /// Open an in-memory SQLite database
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("failed to create memory db: {}", e)))?;

        let backend = Self {
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        Ok(backend)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::Storage(format!("failed to create tables: {}", e)))?;

        // SPOG is the primary key; the other orders get covering indexes.
        for perm in &Permutation::ALL[1..] {
            conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS idx_quads_{} ON quads({});",
                perm.name(),
                key_columns(*perm)
            ))
            .map_err(|e| Error::Storage(format!("failed to create index: {}", e)))?;
        }
        debug!("sqlite schema ready");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("lock poisoned".into()))
    }
}

impl StorageBackend for SqliteBackend {
    fn get_term(&self, id: TermId) -> Result<Option<Term>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT kind, lexical, lang, datatype FROM terms WHERE id = ?1")?;
        let row = stmt
            .query_row(params![id.as_i64()], |row| {
                Ok((
                    row.get::<_, u8>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .optional()?;

        let Some((tag, lexical, lang, datatype)) = row else {
            return Ok(None);
        };
        let term = match TermKind::from_tag(tag) {
            Some(TermKind::NamedNode) => Term::NamedNode(lexical),
            Some(TermKind::BlankNode) => Term::BlankNode(lexical),
            Some(TermKind::Literal) => Term::Literal(Literal::from_parts(lexical, lang, datatype)),
            None => {
                return Err(Error::Serialization(format!(
                    "term {} has unknown kind tag {}",
                    id, tag
                )))
            }
        };
        Ok(Some(term))
    }

    fn find_term(&self, hash: u64, canonical: &str) -> Result<Option<TermId>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached("SELECT id FROM terms WHERE hash = ?1 AND canonical = ?2")?;
        let id = stmt
            .query_row(params![hash as i64, canonical], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(id.map(TermId::from_i64))
    }

    fn term_exists(&self, id: TermId) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT 1 FROM terms WHERE id = ?1")?;
        Ok(stmt.exists(params![id.as_i64()])?)
    }

    fn put_term(&self, id: TermId, hash: u64, canonical: &str, term: &Term) -> Result<()> {
        let conn = self.lock()?;
        let (lang, datatype) = match term {
            Term::Literal(lit) => (lit.language(), lit.explicit_datatype()),
            _ => (None, None),
        };
        conn.prepare_cached(
            "INSERT INTO terms (id, kind, lexical, lang, datatype, hash, canonical)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?
        .execute(params![
            id.as_i64(),
            term.kind().tag(),
            term.value(),
            lang,
            datatype,
            hash as i64,
            canonical
        ])
        .map_err(|e| Error::Storage(format!("sqlite term insert error: {}", e)))?;
        Ok(())
    }

    fn term_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM terms", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn insert(&self, triple: &Triple) -> Result<bool> {
        let conn = self.lock()?;
        let changes = conn
            .prepare_cached("INSERT OR IGNORE INTO quads (s, p, o, g) VALUES (?1, ?2, ?3, ?4)")?
            .execute(params_from_iter(triple.to_array().map(TermId::as_i64)))
            .map_err(|e| Error::Storage(format!("sqlite insert error: {}", e)))?;
        Ok(changes > 0)
    }

    fn insert_batch(&self, triples: &[Triple]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO quads (s, p, o, g) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for triple in triples {
                added += stmt.execute(params_from_iter(triple.to_array().map(TermId::as_i64)))?;
            }
        }
        tx.commit()
            .map_err(|e| Error::Storage(format!("sqlite commit error: {}", e)))?;
        Ok(added)
    }

    fn remove(&self, triple: &Triple) -> Result<bool> {
        let conn = self.lock()?;
        let changes = conn
            .prepare_cached("DELETE FROM quads WHERE s = ?1 AND p = ?2 AND o = ?3 AND g = ?4")?
            .execute(params_from_iter(triple.to_array().map(TermId::as_i64)))
            .map_err(|e| Error::Storage(format!("sqlite delete error: {}", e)))?;
        Ok(changes > 0)
    }

    fn remove_matching(&self, pattern: &TriplePattern) -> Result<usize> {
        let (clauses, params) = where_clause(pattern);
        let sql = format!("DELETE FROM quads{}", render_where(&clauses));
        let conn = self.lock()?;
        let removed = conn
            .execute(&sql, params_from_iter(params.iter()))
            .map_err(|e| Error::Storage(format!("sqlite delete error: {}", e)))?;
        Ok(removed)
    }

    fn scan_page(
        &self,
        pattern: &TriplePattern,
        after: Option<&Triple>,
        limit: usize,
    ) -> Result<Vec<Triple>> {
        let perm = Permutation::for_pattern(pattern);
        let columns = key_columns(perm);
        let (mut clauses, mut params) = where_clause(pattern);
        if let Some(after) = after {
            clauses.push(format!("({}) > (?, ?, ?, ?)", columns));
            params.extend(perm.key(after).map(TermId::as_i64));
        }
        params.push(limit.min(i64::MAX as usize) as i64);

        let sql = format!(
            "SELECT s, p, o, g FROM quads{} ORDER BY {} LIMIT ?",
            render_where(&clauses),
            columns
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), row_to_triple)
            .map_err(|e| Error::Storage(format!("sqlite query error: {}", e)))?;
        let page = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(page)
    }

    fn count(&self, pattern: &TriplePattern) -> Result<usize> {
        let (clauses, params) = where_clause(pattern);
        let sql = format!("SELECT COUNT(*) FROM quads{}", render_where(&clauses));
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }

    fn graphs(&self) -> Result<Vec<TermId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT DISTINCT g FROM quads ORDER BY g")?;
        let graphs = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(TermId::from_i64))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(graphs)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM quads; DELETE FROM terms;")?;
        Ok(())
    }

    fn size_bytes(&self) -> usize {
        let conn = match self.conn.lock() {
            Ok(c) => c,
            Err(_) => return 0,
        };

        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(0);

        (page_count * page_size) as usize
    }

    fn flush(&self) -> Result<()> {
        // Commits are durable already; fold the WAL back into the main file.
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| Error::Storage(format!("sqlite checkpoint error: {}", e)))?;
        Ok(())
    }
}
