//! Database Connection Management
//!
//! Core database connection and initialization for the CareerCanvas node
//! table, using libsql/Turso.
//!
//! # Architecture
//!
//! - **Path-agnostic**: accepts any valid `PathBuf`; parent directories are
//!   created on demand
//! - **Flat node table**: the hierarchy is a nullable self-referencing
//!   `parent_id` column, `ON DELETE SET NULL`
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: enabled for referential integrity
//! - **Recursive CTEs**: ancestor-chain and subtree traversal run in SQL,
//!   bounded by an explicit depth column
//!
//! # Database Connection Patterns
//!
//! Always use `connect_with_timeout()` in async functions. The 5-second
//! busy timeout allows concurrent operations to wait and retry instead of
//! failing immediately with `SQLITE_BUSY` errors.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use libsql::{Builder, Connection, Database};

use crate::db::error::DatabaseError;
use crate::models::NodeType;
use crate::services::MAX_TRAVERSAL_DEPTH;

/// Column list shared by every node query; `row_to_node` relies on this
/// exact order.
pub(crate) const NODE_COLUMNS: &str =
    "id, node_type, parent_id, owner_id, meta, version, created_at, updated_at";

/// Database service for managing the libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use careercanvas_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/path/to/careercanvas.db");
///     let db_service = DatabaseService::new(db_path).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database connection (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

/// Parameters for node insertion (avoids too-many-arguments lint)
pub struct DbCreateNodeParams<'a> {
    pub id: &'a str,
    pub node_type: &'a str,
    pub parent_id: Option<&'a str>,
    pub owner_id: &'a str,
    pub meta: &'a str,
}

/// Outcome of [`DatabaseService::db_create_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbCreateResult {
    Created,
    /// The requested parent does not exist for this owner
    ParentMissing,
}

/// Outcome of [`DatabaseService::db_move_node`].
///
/// Every way the in-transaction re-validation can fail is an explicit
/// variant so callers never have to string-match SQL errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DbMoveResult {
    Moved,
    NodeMissing,
    ParentMissing,
    EdgeIncompatible {
        parent_type: NodeType,
        child_type: NodeType,
    },
    WouldCycle {
        path: Vec<String>,
    },
    Conflict {
        expected: i64,
        actual: i64,
    },
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Enable SQLite features (WAL mode, foreign keys)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the parent directory cannot be created,
    /// the connection fails, or schema initialization fails.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        // Only new databases need the WAL checkpoint at the end of schema
        // initialization.
        let is_new_database = !db_path.exists();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Create an in-memory DatabaseService (primarily for tests and tooling)
    pub async fn new_in_memory() -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(":memory:");
        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(true).await?;

        Ok(service)
    }

    /// Open a raw connection. Prefer [`Self::connect_with_timeout`] in async
    /// contexts.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Open a connection with a 5-second busy timeout.
    ///
    /// The timeout makes SQLite wait and retry instead of failing
    /// immediately with `SQLITE_BUSY` when another connection holds the
    /// write lock.
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        Ok(conn)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of
    /// execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Creates the node table and indexes using CREATE TABLE IF NOT EXISTS,
    /// ensuring idempotent initialization (safe to call multiple times).
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        // Enable WAL mode for better concurrency
        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        // Enable foreign key constraints
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                parent_id TEXT,
                owner_id TEXT NOT NULL,
                meta JSON NOT NULL DEFAULT '{}',
                version INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                -- Parent deletion detaches children (never cascades)
                FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE SET NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create nodes table: {}", e))
        })?;

        self.create_core_indexes(&conn).await?;

        // Flush the schema to disk for newly created databases so rapid
        // open/close sequences in tests never observe a missing table.
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create the core indexes backing owner scoping and traversal.
    async fn create_core_indexes(&self, conn: &Connection) -> Result<(), DatabaseError> {
        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_nodes_owner ON nodes(owner_id)",
            "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type)",
            "CREATE INDEX IF NOT EXISTS idx_nodes_owner_parent ON nodes(owner_id, parent_id)",
        ];

        for sql in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create index: {}", e))
            })?;
        }

        Ok(())
    }

    //
    // NODE STORE OPERATIONS
    // SQL extracted behind the NodeStore trait; no business rules live here
    // except the in-transaction re-validation of move.
    //

    /// Insert a node, verifying in the same transaction that the requested
    /// parent exists for the owner.
    pub async fn db_create_node(
        &self,
        params: DbCreateNodeParams<'_>,
    ) -> Result<DbCreateResult, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin create transaction: {}", e))
        })?;

        if let Some(parent_id) = params.parent_id {
            let parent = Self::fetch_type_and_version(&conn, parent_id, params.owner_id).await;
            match parent {
                Ok(Some(_)) => {}
                Ok(None) => {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Ok(DbCreateResult::ParentMissing);
                }
                Err(e) => {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(e);
                }
            }
        }

        let inserted = conn
            .execute(
                "INSERT INTO nodes (id, node_type, parent_id, owner_id, meta)
                 VALUES (?, ?, ?, ?, ?)",
                (
                    params.id,
                    params.node_type,
                    params.parent_id,
                    params.owner_id,
                    params.meta,
                ),
            )
            .await;

        if let Err(e) = inserted {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to insert node {}: {}",
                params.id, e
            )));
        }

        conn.execute("COMMIT", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to commit create transaction: {}", e))
        })?;

        Ok(DbCreateResult::Created)
    }

    /// Retrieve a single node by ID, scoped to the owner.
    ///
    /// Returns the raw libsql Row; the store converts it to a `Node`.
    pub async fn db_get_node(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes WHERE id = ? AND owner_id = ?"
            ))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare get_node query: {}", e))
            })?;

        let mut rows = stmt.query((id, owner_id)).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_node query: {}", e))
        })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Replace a node's metadata document, bumping `version` and
    /// `updated_at`.
    ///
    /// Returns the number of rows affected (0 = node absent for this owner).
    pub async fn db_update_meta(
        &self,
        id: &str,
        owner_id: &str,
        meta: &str,
    ) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "UPDATE nodes
             SET meta = ?, version = version + 1, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND owner_id = ?",
            (meta, id, owner_id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to update node meta: {}", e)))
    }

    /// Delete a node, detaching its direct children in the same transaction.
    ///
    /// Children get `parent_id = NULL` (with a version bump) rather than a
    /// cascade delete; the node row is then removed. Returns the number of
    /// node rows deleted (0 = node didn't exist for this owner).
    pub async fn db_delete_node(&self, id: &str, owner_id: &str) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin delete transaction: {}", e))
        })?;

        let detached = conn
            .execute(
                "UPDATE nodes
                 SET parent_id = NULL, version = version + 1, updated_at = CURRENT_TIMESTAMP
                 WHERE parent_id = ? AND owner_id = ?",
                (id, owner_id),
            )
            .await;

        if let Err(e) = detached {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to detach children of {}: {}",
                id, e
            )));
        }

        let deleted = conn
            .execute(
                "DELETE FROM nodes WHERE id = ? AND owner_id = ?",
                (id, owner_id),
            )
            .await;

        let rows_affected = match deleted {
            Ok(rows) => rows,
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::sql_execution(format!(
                    "Failed to delete node {}: {}",
                    id, e
                )));
            }
        };

        conn.execute("COMMIT", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to commit delete transaction: {}", e))
        })?;

        Ok(rows_affected)
    }

    /// Direct children of a node, in creation order.
    pub async fn db_get_children(
        &self,
        parent_id: &str,
        owner_id: &str,
    ) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes
                 WHERE parent_id = ? AND owner_id = ?
                 ORDER BY created_at, rowid"
            ))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare get_children query: {}", e))
            })?;

        stmt.query((parent_id, owner_id)).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_children query: {}", e))
        })
    }

    /// Nodes with no parent, in creation order.
    pub async fn db_get_root_nodes(&self, owner_id: &str) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes
                 WHERE owner_id = ? AND parent_id IS NULL
                 ORDER BY created_at, rowid"
            ))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to prepare get_root_nodes query: {}",
                    e
                ))
            })?;

        stmt.query([owner_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_root_nodes query: {}", e))
        })
    }

    /// Every node belonging to the owner, in creation order.
    pub async fn db_get_all_nodes(&self, owner_id: &str) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes
                 WHERE owner_id = ?
                 ORDER BY created_at, rowid"
            ))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to prepare get_all_nodes query: {}",
                    e
                ))
            })?;

        stmt.query([owner_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_all_nodes query: {}", e))
        })
    }

    /// Ancestor chain from a node up toward its root via a recursive CTE.
    ///
    /// The chain starts at the node itself (`depth = 0`) and is bounded by
    /// [`MAX_TRAVERSAL_DEPTH`] so it terminates even over corrupted,
    /// cyclic data. The caller deduplicates repeated ids on read.
    pub async fn db_get_ancestors(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let sql = format!(
            "WITH RECURSIVE ancestor_chain(id, node_type, parent_id, owner_id, meta, version, created_at, updated_at, depth) AS (
                 SELECT {NODE_COLUMNS}, 0
                 FROM nodes WHERE id = ? AND owner_id = ?
                 UNION ALL
                 SELECT n.id, n.node_type, n.parent_id, n.owner_id, n.meta, n.version, n.created_at, n.updated_at, c.depth + 1
                 FROM nodes n
                 JOIN ancestor_chain c ON n.id = c.parent_id
                 WHERE n.owner_id = ? AND c.depth < ?
             )
             SELECT {NODE_COLUMNS} FROM ancestor_chain ORDER BY depth"
        );

        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare get_ancestors query: {}", e))
        })?;

        stmt.query((id, owner_id, owner_id, MAX_TRAVERSAL_DEPTH as i64))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to execute get_ancestors query: {}",
                    e
                ))
            })
    }

    /// Node plus descendants down to `max_depth` levels via a recursive CTE.
    pub async fn db_get_subtree(
        &self,
        id: &str,
        owner_id: &str,
        max_depth: usize,
    ) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let sql = format!(
            "WITH RECURSIVE subtree(id, node_type, parent_id, owner_id, meta, version, created_at, updated_at, seq, depth) AS (
                 SELECT {NODE_COLUMNS}, rowid, 0
                 FROM nodes WHERE id = ? AND owner_id = ?
                 UNION ALL
                 SELECT n.id, n.node_type, n.parent_id, n.owner_id, n.meta, n.version, n.created_at, n.updated_at, n.rowid, s.depth + 1
                 FROM nodes n
                 JOIN subtree s ON n.parent_id = s.id
                 WHERE n.owner_id = ? AND s.depth < ?
             )
             SELECT {NODE_COLUMNS} FROM subtree ORDER BY depth, created_at, seq"
        );

        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare get_subtree query: {}", e))
        })?;

        let capped_depth = max_depth.min(MAX_TRAVERSAL_DEPTH) as i64;
        stmt.query((id, owner_id, owner_id, capped_depth))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to execute get_subtree query: {}", e))
            })
    }

    /// Nodes of one type for the owner, optionally restricted to one parent.
    pub async fn db_get_nodes_by_type(
        &self,
        node_type: &str,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        match parent_id {
            Some(parent_id) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {NODE_COLUMNS} FROM nodes
                         WHERE node_type = ? AND owner_id = ? AND parent_id = ?
                         ORDER BY created_at, rowid"
                    ))
                    .await
                    .map_err(|e| {
                        DatabaseError::sql_execution(format!(
                            "Failed to prepare get_nodes_by_type query: {}",
                            e
                        ))
                    })?;

                stmt.query((node_type, owner_id, parent_id))
                    .await
                    .map_err(|e| {
                        DatabaseError::sql_execution(format!(
                            "Failed to execute get_nodes_by_type query: {}",
                            e
                        ))
                    })
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {NODE_COLUMNS} FROM nodes
                         WHERE node_type = ? AND owner_id = ?
                         ORDER BY created_at, rowid"
                    ))
                    .await
                    .map_err(|e| {
                        DatabaseError::sql_execution(format!(
                            "Failed to prepare get_nodes_by_type query: {}",
                            e
                        ))
                    })?;

                stmt.query((node_type, owner_id)).await.map_err(|e| {
                    DatabaseError::sql_execution(format!(
                        "Failed to execute get_nodes_by_type query: {}",
                        e
                    ))
                })
            }
        }
    }

    /// Reassign a node's parent inside one immediate transaction.
    ///
    /// The transaction re-reads the node and the proposed parent, re-checks
    /// edge-type compatibility and acyclicity against that snapshot, and
    /// persists with a version compare-and-swap. SQLite's single writer plus
    /// the CAS means two racing moves cannot jointly commit a cycle; the
    /// loser surfaces as [`DbMoveResult::Conflict`].
    pub async fn db_move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        owner_id: &str,
        expected_version: i64,
    ) -> Result<DbMoveResult, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin move transaction: {}", e))
        })?;

        let result =
            Self::move_in_transaction(&conn, id, new_parent_id, owner_id, expected_version).await;

        match result {
            Ok(DbMoveResult::Moved) => {
                conn.execute("COMMIT", ()).await.map_err(|e| {
                    DatabaseError::sql_execution(format!(
                        "Failed to commit move transaction: {}",
                        e
                    ))
                })?;
                Ok(DbMoveResult::Moved)
            }
            other => {
                // Rejections and failures leave state untouched
                let _rollback = conn.execute("ROLLBACK", ()).await;
                other
            }
        }
    }

    /// The body of the move transaction: re-read, re-validate, CAS-update.
    async fn move_in_transaction(
        conn: &Connection,
        id: &str,
        new_parent_id: Option<&str>,
        owner_id: &str,
        expected_version: i64,
    ) -> Result<DbMoveResult, DatabaseError> {
        let Some((child_type, version)) = Self::fetch_type_and_version(conn, id, owner_id).await?
        else {
            return Ok(DbMoveResult::NodeMissing);
        };

        if version != expected_version {
            return Ok(DbMoveResult::Conflict {
                expected: expected_version,
                actual: version,
            });
        }

        if let Some(parent_id) = new_parent_id {
            if parent_id == id {
                return Ok(DbMoveResult::WouldCycle {
                    path: vec![id.to_string()],
                });
            }

            let Some((parent_type, _)) =
                Self::fetch_type_and_version(conn, parent_id, owner_id).await?
            else {
                return Ok(DbMoveResult::ParentMissing);
            };

            if !parent_type.allows_child(child_type) {
                return Ok(DbMoveResult::EdgeIncompatible {
                    parent_type,
                    child_type,
                });
            }

            // Walk the proposed parent's ancestor chain under the write
            // lock. Reaching the moved node means the move would close a
            // cycle; the visited set and depth bound keep the walk finite
            // over already-corrupted data.
            let mut walked: Vec<String> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            let mut current = Some(parent_id.to_string());
            while let Some(cur) = current.take() {
                if cur == id {
                    walked.push(cur);
                    walked.reverse();
                    return Ok(DbMoveResult::WouldCycle { path: walked });
                }
                if !seen.insert(cur.clone()) || seen.len() > MAX_TRAVERSAL_DEPTH {
                    break;
                }
                let parent = Self::fetch_parent_id(conn, &cur, owner_id).await?;
                walked.push(cur);
                current = parent.flatten();
            }
        }

        let rows_affected = conn
            .execute(
                "UPDATE nodes
                 SET parent_id = ?, version = version + 1, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ? AND owner_id = ? AND version = ?",
                (new_parent_id, id, owner_id, expected_version),
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to move node: {}", e)))?;

        if rows_affected == 0 {
            // Unreachable inside the immediate transaction, but the CAS is
            // the final arbiter either way.
            return Ok(DbMoveResult::Conflict {
                expected: expected_version,
                actual: version,
            });
        }

        Ok(DbMoveResult::Moved)
    }

    /// Aggregate counts and depth for one owner's forest.
    pub async fn db_get_hierarchy_stats(
        &self,
        owner_id: &str,
    ) -> Result<(Vec<(String, usize)>, usize, usize), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut by_type: Vec<(String, usize)> = Vec::new();
        let mut stmt = conn
            .prepare("SELECT node_type, COUNT(*) FROM nodes WHERE owner_id = ? GROUP BY node_type")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare stats query: {}", e))
            })?;
        let mut rows = stmt.query([owner_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute stats query: {}", e))
        })?;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let node_type: String = row
                .get(0)
                .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
            by_type.push((node_type, count as usize));
        }

        let root_nodes = self
            .query_count(
                &conn,
                "SELECT COUNT(*) FROM nodes WHERE owner_id = ? AND parent_id IS NULL",
                owner_id,
            )
            .await?;

        // Depth of the deepest leaf, walking down from every root; a lone
        // root has depth 0. Depth-capped so corrupted data cannot spin the
        // recursion.
        let sql = format!(
            "WITH RECURSIVE depths(id, depth) AS (
                 SELECT id, 0 FROM nodes WHERE owner_id = ? AND parent_id IS NULL
                 UNION ALL
                 SELECT n.id, d.depth + 1
                 FROM nodes n
                 JOIN depths d ON n.parent_id = d.id
                 WHERE n.owner_id = ? AND d.depth < {MAX_TRAVERSAL_DEPTH}
             )
             SELECT COALESCE(MAX(depth), 0) FROM depths"
        );
        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare depth query: {}", e))
        })?;
        let mut rows = stmt.query((owner_id, owner_id)).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute depth query: {}", e))
        })?;
        let max_depth = match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => {
                let depth: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
                depth as usize
            }
            None => 0,
        };

        Ok((by_type, max_depth, root_nodes))
    }

    /// Flush pending WAL frames and release resources.
    pub async fn db_close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }

    async fn query_count(
        &self,
        conn: &Connection,
        sql: &str,
        owner_id: &str,
    ) -> Result<usize, DatabaseError> {
        let mut stmt = conn.prepare(sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare count query: {}", e))
        })?;
        let mut rows = stmt.query([owner_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute count query: {}", e))
        })?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
                Ok(count as usize)
            }
            None => Ok(0),
        }
    }

    /// Fetch `(node_type, version)` for a node, owner-scoped.
    async fn fetch_type_and_version(
        conn: &Connection,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<(NodeType, i64)>, DatabaseError> {
        let mut stmt = conn
            .prepare("SELECT node_type, version FROM nodes WHERE id = ? AND owner_id = ?")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare node lookup: {}", e))
            })?;

        let mut rows = stmt.query((id, owner_id)).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute node lookup: {}", e))
        })?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => {
                let type_str: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
                let version: i64 = row
                    .get(1)
                    .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
                let node_type = NodeType::from_db_value(&type_str).ok_or_else(|| {
                    DatabaseError::corrupt_row(id, format!("unknown node type '{}'", type_str))
                })?;
                Ok(Some((node_type, version)))
            }
            None => Ok(None),
        }
    }

    /// Fetch a node's `parent_id`, owner-scoped.
    ///
    /// Outer `None` = no such row; inner `None` = the node is a root.
    async fn fetch_parent_id(
        conn: &Connection,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<Option<String>>, DatabaseError> {
        let mut stmt = conn
            .prepare("SELECT parent_id FROM nodes WHERE id = ? AND owner_id = ?")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare parent lookup: {}", e))
            })?;

        let mut rows = stmt.query((id, owner_id)).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute parent lookup: {}", e))
        })?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => {
                let parent_id: Option<String> = row
                    .get(0)
                    .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
                Ok(Some(parent_id))
            }
            None => Ok(None),
        }
    }
}
