//! SQLite persistence for the outline graph.
//!
//! # Responsibility
//! - Store sync payloads: one item row plus the full child list of every
//!   context the submit touched.
//! - Rebuild a consistent [`GraphState`] from stored items.
//!
//! # Invariants
//! - One job is written in one immediate transaction; a failed job leaves
//!   no partial rows behind.
//! - A context's stored child list is replaced wholesale by each payload
//!   that carries it.
//! - Item memberships are the source of truth on load. Stored child rows
//!   only contribute registration timestamps; rows with no backing
//!   membership are dropped.
//! - Loading never returns a state whose two maps disagree.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::graph::error::GraphError;
use crate::graph::state::GraphState;
use crate::model::item::{ContextChild, ContextMembership, Item};
use crate::model::rank::Rank;
use crate::store::context_index::ContextIndex;
use crate::store::item_store::ItemStore;
use crate::sync::job::{PersistenceSink, SyncError, SyncJob};
use log::{error, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const SQLITE_SINK_ID: &str = "sqlite";

pub type GraphRepoResult<T> = Result<T, GraphRepoError>;

/// Errors from graph repository operations.
#[derive(Debug)]
pub enum GraphRepoError {
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Stored row cannot be converted into the model.
    InvalidData(String),
    /// Stored items load but their memberships violate graph invariants.
    Inconsistent(GraphError),
}

impl GraphRepoError {
    /// Stable code reported through [`SyncError`].
    pub fn code(&self) -> &'static str {
        match self {
            Self::Db(_) => "db_error",
            Self::UninitializedConnection { .. } => "uninitialized_connection",
            Self::MissingRequiredTable(_) | Self::MissingRequiredColumn { .. } => "schema_mismatch",
            Self::InvalidData(_) => "invalid_data",
            Self::Inconsistent(_) => "inconsistent_graph",
        }
    }
}

impl Display for GraphRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "graph repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "graph repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "graph repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid graph data: {message}"),
            Self::Inconsistent(err) => write!(f, "stored graph is inconsistent: {err}"),
        }
    }
}

impl Error for GraphRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Inconsistent(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for GraphRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GraphRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for stored graph rows.
pub trait GraphRepository {
    /// Writes one sync payload.
    fn apply_job(&self, job: &SyncJob) -> GraphRepoResult<()>;
    /// Reads one stored item by value.
    fn get_item(&self, value: &str) -> GraphRepoResult<Option<Item>>;
    /// Reads the stored child list of one encoded context key, in rank order.
    fn list_context(&self, context_key: &str) -> GraphRepoResult<Vec<ContextChild>>;
    /// Rebuilds the full graph state from stored items.
    fn load_state(&self) -> GraphRepoResult<GraphState>;
}

/// SQLite-backed graph repository.
pub struct SqliteGraphRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGraphRepository<'conn> {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - When the connection is not at the latest schema version or the
    ///   expected tables and columns are missing.
    pub fn try_new(conn: &'conn Connection) -> GraphRepoResult<Self> {
        ensure_graph_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl GraphRepository for SqliteGraphRepository<'_> {
    fn apply_job(&self, job: &SyncJob) -> GraphRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        upsert_item(&tx, &job.payload.item)?;
        for (context_key, children) in &job.payload.context_updates {
            replace_context(&tx, context_key, children)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_item(&self, value: &str) -> GraphRepoResult<Option<Item>> {
        let row = self
            .conn
            .query_row(
                "SELECT value, member_of, created_at, updated_at FROM items WHERE value = ?1;",
                [value],
                read_item_columns,
            )
            .optional()?;
        row.map(parse_item).transpose()
    }

    fn list_context(&self, context_key: &str) -> GraphRepoResult<Vec<ContextChild>> {
        let mut stmt = self.conn.prepare(
            "SELECT child_key, rank, created_at, updated_at
             FROM context_children
             WHERE context_key = ?1
             ORDER BY rank ASC, created_at ASC, child_key ASC;",
        )?;
        let rows = stmt.query_map([context_key], parse_child)?;
        let mut children = Vec::new();
        for row in rows {
            children.push(row?);
        }
        Ok(children)
    }

    fn load_state(&self) -> GraphRepoResult<GraphState> {
        let mut items = ItemStore::new();
        let mut stmt = self
            .conn
            .prepare("SELECT value, member_of, created_at, updated_at FROM items;")?;
        let rows = stmt.query_map([], read_item_columns)?;
        for row in rows {
            items.insert(parse_item(row?)?);
        }

        let mut grouped: BTreeMap<String, Vec<ContextChild>> = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT context_key, child_key, rank, created_at, updated_at FROM context_children;",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let context_key: String = row.get(0)?;
            let child = ContextChild {
                key: row.get(1)?,
                rank: Rank(row.get(2)?),
                created: row.get(3)?,
                last_updated: row.get(4)?,
            };
            grouped.entry(context_key).or_default().push(child);
        }

        let mut stored = ContextIndex::new();
        for (context_key, children) in grouped {
            stored.put_entry(context_key, children);
        }

        let (state, rebuild) = GraphState::rebuild(items, &stored);
        state
            .check_consistency()
            .map_err(GraphRepoError::Inconsistent)?;
        if rebuild.orphan_rows > 0 || rebuild.missing_rows > 0 {
            warn!(
                "event=graph_load module=repo status=warn orphan_rows={} missing_rows={}",
                rebuild.orphan_rows, rebuild.missing_rows
            );
        }
        info!(
            "event=graph_load module=repo status=ok items={} contexts={}",
            state.items().len(),
            state.context_index().len()
        );
        Ok(state)
    }
}

impl PersistenceSink for SqliteGraphRepository<'_> {
    fn sink_id(&self) -> &str {
        SQLITE_SINK_ID
    }

    fn sync_one(&self, job: &SyncJob) -> Result<(), SyncError> {
        self.apply_job(job).map_err(|err| {
            error!(
                "event=graph_store module=repo status=error job_id={} error_code={}",
                job.job_id,
                err.code()
            );
            SyncError::new(SQLITE_SINK_ID, err.code(), err.to_string())
        })
    }
}

type ItemColumns = (String, String, i64, i64);

fn read_item_columns(row: &Row<'_>) -> rusqlite::Result<ItemColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn parse_item((value, member_of, created, last_updated): ItemColumns) -> GraphRepoResult<Item> {
    let member_of: Vec<ContextMembership> = serde_json::from_str(&member_of).map_err(|err| {
        GraphRepoError::InvalidData(format!("items.member_of is not a membership list: {err}"))
    })?;
    Ok(Item {
        value,
        member_of,
        created,
        last_updated,
    })
}

fn parse_child(row: &Row<'_>) -> rusqlite::Result<ContextChild> {
    Ok(ContextChild {
        key: row.get(0)?,
        rank: Rank(row.get(1)?),
        created: row.get(2)?,
        last_updated: row.get(3)?,
    })
}

fn upsert_item(conn: &Connection, item: &Item) -> GraphRepoResult<()> {
    let member_of = serde_json::to_string(&item.member_of)
        .map_err(|err| GraphRepoError::InvalidData(format!("cannot encode memberships: {err}")))?;
    conn.execute(
        "INSERT INTO items (value, member_of, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(value) DO UPDATE SET
             member_of = excluded.member_of,
             updated_at = excluded.updated_at;",
        params![item.value, member_of, item.created, item.last_updated],
    )?;
    Ok(())
}

fn replace_context(
    conn: &Connection,
    context_key: &str,
    children: &[ContextChild],
) -> GraphRepoResult<()> {
    conn.execute(
        "DELETE FROM context_children WHERE context_key = ?1;",
        [context_key],
    )?;
    let mut insert = conn.prepare(
        "INSERT INTO context_children (context_key, child_key, rank, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5);",
    )?;
    for child in children {
        insert.execute(params![
            context_key,
            child.key,
            child.rank.0,
            child.created,
            child.last_updated
        ])?;
    }
    Ok(())
}

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("items", &["value", "member_of", "created_at", "updated_at"]),
    (
        "context_children",
        &["context_key", "child_key", "rank", "created_at", "updated_at"],
    ),
];

fn ensure_graph_connection_ready(conn: &Connection) -> GraphRepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(GraphRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in REQUIRED_COLUMNS {
        let present = table_columns(conn, table)?;
        if present.is_empty() {
            return Err(GraphRepoError::MissingRequiredTable(table));
        }
        if let Some(column) = columns
            .iter()
            .copied()
            .find(|column| !present.iter().any(|name| name == column))
        {
            return Err(GraphRepoError::MissingRequiredColumn { table, column });
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> GraphRepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = Vec::new();
    for name in names {
        columns.push(name?);
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::{GraphRepoError, GraphRepository, SqliteGraphRepository};
    use crate::db::open_db_in_memory;
    use crate::graph::state::{GraphState, SubmitRequest};
    use crate::model::path::encode_path;
    use crate::model::rank::Rank;
    use crate::sync::job::{PersistenceSink, SyncJob};
    use rusqlite::Connection;

    fn path(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn persist_all(repo: &SqliteGraphRepository<'_>, requests: &[SubmitRequest]) -> GraphState {
        let mut state = GraphState::new();
        for (offset, request) in requests.iter().enumerate() {
            let commit = state.submit_item(request, 10 + offset as i64).unwrap();
            for payload in commit.sync_payloads {
                repo.sync_one(&SyncJob::new(commit.state.revision(), payload, 0))
                    .unwrap();
            }
            state = commit.state;
        }
        state
    }

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let result = SqliteGraphRepository::try_new(&conn);
        assert!(matches!(
            result,
            Err(GraphRepoError::UninitializedConnection { .. })
        ));
    }

    #[test]
    fn persisted_jobs_reload_into_equal_graph() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteGraphRepository::try_new(&conn).unwrap();
        let state = persist_all(
            &repo,
            &[
                SubmitRequest::thought("Cat", path(&["Animal"]), Rank(0)),
                SubmitRequest::thought("Dog", path(&["Animal"]), Rank(1)),
                SubmitRequest::thought("Cat", path(&["Pet"]), Rank(0)),
            ],
        );

        let loaded = repo.load_state().unwrap();
        assert_eq!(loaded.items(), state.items());
        assert_eq!(loaded.context_index(), state.context_index());

        let animal = repo.list_context(&encode_path(&["Animal"])).unwrap();
        let keys: Vec<&str> = animal.iter().map(|child| child.key.as_str()).collect();
        assert_eq!(keys, vec!["Cat", "Dog"]);

        let cat = repo.get_item("Cat").unwrap().unwrap();
        assert_eq!(cat.member_of.len(), 2);
        assert!(repo.get_item("Horse").unwrap().is_none());
    }

    #[test]
    fn corrupt_membership_json_is_invalid_data() {
        let conn = open_db_in_memory().unwrap();
        conn.execute(
            "INSERT INTO items (value, member_of, created_at, updated_at) VALUES ('Cat', 'nope', 1, 1);",
            [],
        )
        .unwrap();
        let repo = SqliteGraphRepository::try_new(&conn).unwrap();
        assert!(matches!(
            repo.get_item("Cat"),
            Err(GraphRepoError::InvalidData(_))
        ));
    }

    #[test]
    fn orphan_context_row_is_dropped_on_load() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteGraphRepository::try_new(&conn).unwrap();
        persist_all(
            &repo,
            &[SubmitRequest::thought("Cat", path(&["Animal"]), Rank(0))],
        );
        conn.execute(
            "INSERT INTO context_children (context_key, child_key, rank, created_at, updated_at)
             VALUES ('Animal', 'Ghost', 1, 1, 1);",
            [],
        )
        .unwrap();

        let loaded = repo.load_state().unwrap();
        loaded.check_consistency().unwrap();
        assert_eq!(loaded.queries().children_of(&["Animal"]), vec!["Cat"]);
        assert!(loaded.items().get("Ghost").is_none());
    }

    #[test]
    fn lost_job_leaves_store_loadable() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteGraphRepository::try_new(&conn).unwrap();

        let first = GraphState::new()
            .submit_item(&SubmitRequest::thought("Cat", path(&["Animal"]), Rank(0)), 10)
            .unwrap();
        let second = first
            .state
            .submit_item(&SubmitRequest::thought("Dog", path(&["Animal"]), Rank(1)), 11)
            .unwrap();
        for payload in second.sync_payloads {
            repo.sync_one(&SyncJob::new(second.state.revision(), payload, 0))
                .unwrap();
        }

        let stored = repo.list_context(&encode_path(&["Animal"])).unwrap();
        assert_eq!(stored.len(), 2);

        let loaded = repo.load_state().unwrap();
        loaded.check_consistency().unwrap();
        assert!(loaded.items().get("Cat").is_none());
        assert_eq!(loaded.queries().children_of(&["Animal"]), vec!["Dog"]);
        assert_eq!(loaded.context_index().children_of(&["Animal"])[0].created, 11);
        assert_eq!(loaded.next_rank(&["Animal"]).unwrap(), Rank(2));
    }

    #[test]
    fn duplicate_stored_membership_is_inconsistent() {
        let conn = open_db_in_memory().unwrap();
        conn.execute(
            r#"INSERT INTO items (value, member_of, created_at, updated_at) VALUES (
                'Cat',
                '[{"context":["Animal"],"rank":0},{"context":["Animal"],"rank":3}]',
                1,
                1
            );"#,
            [],
        )
        .unwrap();
        let repo = SqliteGraphRepository::try_new(&conn).unwrap();
        assert!(matches!(
            repo.load_state(),
            Err(GraphRepoError::Inconsistent(_))
        ));
    }
}
