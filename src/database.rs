//! Database Infrastructure Layer
//!
//! Handles database connection, schema initialization, and provides data
//! access methods for users, repositories, issues, pull requests, stars and
//! follows.
//!
//! Denormalized counters (`star_count`, `open_issues_count`) are maintained
//! in the same transaction as the rows they summarize, so they cannot drift
//! from the join-table state. Issue and pull request numbers are computed by
//! the insert statement itself; the UNIQUE(repository_id, number) constraint
//! backstops them. Counter-bearing transactions open with a write statement
//! so concurrent writers queue on the busy timeout.

use std::{ops::Deref, str::FromStr};

use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use tracing::info;

use crate::models::{IssueState, PullRequestState};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum DatabaseError {
    Connection(sqlx::Error),
    Query(sqlx::Error),
    Conflict(String),
    NotFound(String),
    InvalidData(String),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::Connection(err) => write!(f, "Database connection error: {}", err),
            DatabaseError::Query(err) => write!(f, "Database query error: {}", err),
            DatabaseError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseError::Connection(err) | DatabaseError::Query(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::Query(err)
    }
}

/// Map a UNIQUE constraint violation to `Conflict`; pass other errors through.
fn conflict_on_unique(err: sqlx::Error, message: &str) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DatabaseError::Conflict(message.to_string())
        }
        _ => DatabaseError::Query(err),
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

// ============================================================================
// Row Types
// ============================================================================

/// Database row for users table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_active: String,
}

/// Database row for repositories table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepositoryRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub language: String,
    pub star_count: i64,
    pub fork_count: i64,
    pub open_issues_count: i64,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Public repository annotated with its owner's display identity
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PublicRepositoryRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub language: String,
    pub star_count: i64,
    pub fork_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub owner_username: String,
    pub owner_full_name: String,
}

/// Issue row joined with its author's display identity
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IssueRow {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub repository_id: i64,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub author_id: i64,
    pub author_username: String,
    pub author_full_name: String,
}

/// Pull request row joined with its author's display identity
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PullRequestRow {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub head_branch: String,
    pub base_branch: String,
    pub repository_id: i64,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub merged_at: Option<String>,
    pub author_id: i64,
    pub author_username: String,
    pub author_full_name: String,
}

/// Admin listing row: user plus owned-repository count
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminUserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub status: String,
    pub created_at: String,
    pub last_active: String,
    pub repository_count: i64,
}

/// Public directory row: user plus engagement counts
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExploreUserRow {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub repository_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatsRow {
    pub user_count: i64,
    pub repository_count: i64,
    pub issue_count: i64,
}

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Deref for Database {
    type Target = SqlitePool;
    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let database_config = SqliteConnectOptions::from_str(database_url)
            .map_err(DatabaseError::Connection)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_lazy_with(database_config);

        let db = Self { pool };
        db.initialize_tables().await?;

        info!("Database initialized at {}", database_url);
        Ok(db)
    }

    /// Single-connection in-memory database for tests. SQLite drops a
    /// `:memory:` database with its connection, so the pool must not open
    /// more than one.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DatabaseError::Connection)?
            .foreign_keys(true);

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(DatabaseError::Connection)?;

        let db = Self { pool };
        db.initialize_tables().await?;
        Ok(db)
    }

    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                full_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_active TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                is_private INTEGER NOT NULL DEFAULT 0,
                language TEXT NOT NULL DEFAULT 'Unknown',
                star_count INTEGER NOT NULL DEFAULT 0,
                fork_count INTEGER NOT NULL DEFAULT 0,
                open_issues_count INTEGER NOT NULL DEFAULT 0,
                owner_id INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id),
                UNIQUE(owner_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS issues (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number INTEGER NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL DEFAULT 'OPEN',
                author_id INTEGER NOT NULL,
                repository_id INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                closed_at TEXT,
                FOREIGN KEY (author_id) REFERENCES users(id),
                FOREIGN KEY (repository_id) REFERENCES repositories(id),
                UNIQUE(repository_id, number)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pull_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number INTEGER NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL DEFAULT 'OPEN',
                head_branch TEXT NOT NULL,
                base_branch TEXT NOT NULL,
                author_id INTEGER NOT NULL,
                repository_id INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                closed_at TEXT,
                merged_at TEXT,
                FOREIGN KEY (author_id) REFERENCES users(id),
                FOREIGN KEY (repository_id) REFERENCES repositories(id),
                UNIQUE(repository_id, number)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stars (
                user_id INTEGER NOT NULL,
                repository_id INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, repository_id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (repository_id) REFERENCES repositories(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS follows (
                follower_id INTEGER NOT NULL,
                following_id INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (follower_id, following_id),
                FOREIGN KEY (follower_id) REFERENCES users(id),
                FOREIGN KEY (following_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_repositories_owner_id ON repositories(owner_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_issues_repository_id ON issues(repository_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pull_requests_repository_id ON pull_requests(repository_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stars_repository_id ON stars(repository_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========== User Operations ==========

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        full_name: &str,
        password_hash: &str,
    ) -> Result<UserRow> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, full_name, password_hash)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User with this email or username already exists"))?;

        self.get_user_by_id(result.last_insert_rowid()).await
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<UserRow> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    DatabaseError::NotFound(format!("User with id {} not found", id))
                }
                e => DatabaseError::Query(e),
            })
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<UserRow> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    DatabaseError::NotFound(format!("User '{}' not found", username))
                }
                e => DatabaseError::Query(e),
            })
    }

    /// Signin lookup. A miss is `None` rather than `NotFound` so the caller
    /// can answer with the same generic rejection as a bad password.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)
    }

    pub async fn touch_last_active(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_active = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<AdminUserRow>> {
        sqlx::query_as::<_, AdminUserRow>(
            r#"
            SELECT
                u.id, u.username, u.email, u.full_name, u.status,
                u.created_at, u.last_active,
                (SELECT COUNT(*) FROM repositories r WHERE r.owner_id = u.id) AS repository_count
            FROM users u
            ORDER BY u.created_at DESC, u.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn explore_users(&self) -> Result<Vec<ExploreUserRow>> {
        sqlx::query_as::<_, ExploreUserRow>(
            r#"
            SELECT
                u.id, u.username, u.full_name,
                (SELECT COUNT(*) FROM repositories r WHERE r.owner_id = u.id) AS repository_count,
                (SELECT COUNT(*) FROM follows f WHERE f.following_id = u.id) AS follower_count,
                (SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id) AS following_count
            FROM users u
            ORDER BY repository_count DESC, u.username ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn stats(&self) -> Result<StatsRow> {
        sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS user_count,
                (SELECT COUNT(*) FROM repositories) AS repository_count,
                (SELECT COUNT(*) FROM issues) AS issue_count
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    // ========== Repository Operations ==========

    pub async fn create_repository(
        &self,
        owner_id: i64,
        name: &str,
        description: &str,
        is_private: bool,
    ) -> Result<RepositoryRow> {
        let result = sqlx::query(
            r#"
            INSERT INTO repositories (name, description, is_private, owner_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(is_private)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Repository with this name already exists"))?;

        sqlx::query_as::<_, RepositoryRow>("SELECT * FROM repositories WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)
    }

    pub async fn list_repositories_by_owner(&self, owner_id: i64) -> Result<Vec<RepositoryRow>> {
        sqlx::query_as::<_, RepositoryRow>(
            r#"
            SELECT * FROM repositories
            WHERE owner_id = ?
            ORDER BY updated_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn find_repository(&self, owner_id: i64, name: &str) -> Result<RepositoryRow> {
        sqlx::query_as::<_, RepositoryRow>(
            "SELECT * FROM repositories WHERE owner_id = ? AND name = ?",
        )
        .bind(owner_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound(format!("Repository '{}' not found", name))
            }
            e => DatabaseError::Query(e),
        })
    }

    pub async fn list_public_repositories(&self) -> Result<Vec<PublicRepositoryRow>> {
        sqlx::query_as::<_, PublicRepositoryRow>(
            r#"
            SELECT
                r.id, r.name, r.description, r.is_private, r.language,
                r.star_count, r.fork_count, r.created_at, r.updated_at,
                u.username AS owner_username, u.full_name AS owner_full_name
            FROM repositories r
            INNER JOIN users u ON u.id = r.owner_id
            WHERE r.is_private = 0
            ORDER BY r.star_count DESC, r.created_at DESC, r.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    // ========== Star Operations ==========

    pub async fn is_starred(&self, user_id: i64, repository_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stars WHERE user_id = ? AND repository_id = ?",
        )
        .bind(user_id)
        .bind(repository_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Insert the star row and bump the denormalized counter in one
    /// transaction. A duplicate pair is a `Conflict`.
    pub async fn star_repository(&self, user_id: i64, repository_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO stars (user_id, repository_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(repository_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "Repository already starred"))?;

        sqlx::query(
            r#"
            UPDATE repositories
            SET star_count = star_count + 1, updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(repository_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn unstar_repository(&self, user_id: i64, repository_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM stars WHERE user_id = ? AND repository_id = ?")
            .bind(user_id)
            .bind(repository_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::Conflict("Repository not starred".to_string()));
        }

        sqlx::query(
            r#"
            UPDATE repositories
            SET star_count = star_count - 1, updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(repository_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ========== Issue Operations ==========

    /// Assign the next sequential number and bump `open_issues_count` in one
    /// transaction. The insert statement computes the number itself, so the
    /// transaction opens with a write and concurrent creators queue on the
    /// write lock instead of racing a separate read or failing a
    /// read-to-write upgrade. UNIQUE(repository_id, number) backstops it.
    pub async fn create_issue(
        &self,
        repository_id: i64,
        author_id: i64,
        title: &str,
        body: &str,
    ) -> Result<IssueRow> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO issues (number, title, body, author_id, repository_id)
            VALUES (
                (SELECT COALESCE(MAX(number), 0) + 1 FROM issues WHERE repository_id = ?),
                ?, ?, ?, ?
            )
            "#,
        )
        .bind(repository_id)
        .bind(title)
        .bind(body)
        .bind(author_id)
        .bind(repository_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Issue number already taken"))?;

        sqlx::query(
            r#"
            UPDATE repositories
            SET open_issues_count = open_issues_count + 1, updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(repository_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_issue(result.last_insert_rowid()).await
    }

    async fn get_issue(&self, id: i64) -> Result<IssueRow> {
        sqlx::query_as::<_, IssueRow>(
            r#"
            SELECT
                i.id, i.number, i.title, i.body, i.state, i.repository_id,
                i.created_at, i.closed_at,
                u.id AS author_id, u.username AS author_username,
                u.full_name AS author_full_name
            FROM issues i
            INNER JOIN users u ON u.id = i.author_id
            WHERE i.id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound(format!("Issue with id {} not found", id))
            }
            e => DatabaseError::Query(e),
        })
    }

    pub async fn list_issues(&self, repository_id: i64) -> Result<Vec<IssueRow>> {
        sqlx::query_as::<_, IssueRow>(
            r#"
            SELECT
                i.id, i.number, i.title, i.body, i.state, i.repository_id,
                i.created_at, i.closed_at,
                u.id AS author_id, u.username AS author_username,
                u.full_name AS author_full_name
            FROM issues i
            INNER JOIN users u ON u.id = i.author_id
            WHERE i.repository_id = ?
            ORDER BY i.created_at DESC, i.number DESC
            "#,
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    /// OPEN ⇄ CLOSED transition. Closing sets `closed_at` and decrements
    /// `open_issues_count`; reopening reverses both. Re-asserting the current
    /// state is a no-op. Counter and row change in the same transaction,
    /// which opens with the conditional UPDATE so the write lock is taken
    /// before any read.
    pub async fn set_issue_state(
        &self,
        repository_id: i64,
        number: i64,
        state: IssueState,
    ) -> Result<IssueRow> {
        let mut tx = self.pool.begin().await?;

        // Zero rows affected means the issue is missing or already in the
        // requested state; the fetch below distinguishes the two.
        let changed = match state {
            IssueState::Closed => sqlx::query(
                r#"
                UPDATE issues
                SET state = 'CLOSED', closed_at = datetime('now'),
                    updated_at = datetime('now')
                WHERE repository_id = ? AND number = ? AND state = 'OPEN'
                "#,
            ),
            IssueState::Open => sqlx::query(
                r#"
                UPDATE issues
                SET state = 'OPEN', closed_at = NULL, updated_at = datetime('now')
                WHERE repository_id = ? AND number = ? AND state = 'CLOSED'
                "#,
            ),
        }
        .bind(repository_id)
        .bind(number)
        .execute(&mut *tx)
        .await?;

        if changed.rows_affected() > 0 {
            let delta: i64 = match state {
                IssueState::Closed => -1,
                IssueState::Open => 1,
            };
            sqlx::query(
                r#"
                UPDATE repositories
                SET open_issues_count = open_issues_count + ?,
                    updated_at = datetime('now')
                WHERE id = ?
                "#,
            )
            .bind(delta)
            .bind(repository_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get_issue_by_number(repository_id, number).await
    }

    async fn get_issue_by_number(&self, repository_id: i64, number: i64) -> Result<IssueRow> {
        sqlx::query_as::<_, IssueRow>(
            r#"
            SELECT
                i.id, i.number, i.title, i.body, i.state, i.repository_id,
                i.created_at, i.closed_at,
                u.id AS author_id, u.username AS author_username,
                u.full_name AS author_full_name
            FROM issues i
            INNER JOIN users u ON u.id = i.author_id
            WHERE i.repository_id = ? AND i.number = ?
            "#,
        )
        .bind(repository_id)
        .bind(number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound(format!("Issue #{} not found", number))
            }
            e => DatabaseError::Query(e),
        })
    }

    // ========== Pull Request Operations ==========

    /// Numbering works like issues: the insert statement computes the next
    /// number itself, with UNIQUE(repository_id, number) as the backstop.
    /// Issues and pull requests number independently.
    pub async fn create_pull_request(
        &self,
        repository_id: i64,
        author_id: i64,
        title: &str,
        body: &str,
        head_branch: &str,
        base_branch: &str,
    ) -> Result<PullRequestRow> {
        let result = sqlx::query(
            r#"
            INSERT INTO pull_requests
                (number, title, body, head_branch, base_branch, author_id, repository_id)
            VALUES (
                (SELECT COALESCE(MAX(number), 0) + 1 FROM pull_requests WHERE repository_id = ?),
                ?, ?, ?, ?, ?, ?
            )
            "#,
        )
        .bind(repository_id)
        .bind(title)
        .bind(body)
        .bind(head_branch)
        .bind(base_branch)
        .bind(author_id)
        .bind(repository_id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Pull request number already taken"))?;

        self.get_pull_request_by_id(result.last_insert_rowid()).await
    }

    async fn get_pull_request_by_id(&self, id: i64) -> Result<PullRequestRow> {
        sqlx::query_as::<_, PullRequestRow>(
            r#"
            SELECT
                p.id, p.number, p.title, p.body, p.state, p.head_branch,
                p.base_branch, p.repository_id, p.created_at, p.closed_at,
                p.merged_at,
                u.id AS author_id, u.username AS author_username,
                u.full_name AS author_full_name
            FROM pull_requests p
            INNER JOIN users u ON u.id = p.author_id
            WHERE p.id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound(format!("Pull request with id {} not found", id))
            }
            e => DatabaseError::Query(e),
        })
    }

    pub async fn get_pull_request(
        &self,
        repository_id: i64,
        number: i64,
    ) -> Result<PullRequestRow> {
        sqlx::query_as::<_, PullRequestRow>(
            r#"
            SELECT
                p.id, p.number, p.title, p.body, p.state, p.head_branch,
                p.base_branch, p.repository_id, p.created_at, p.closed_at,
                p.merged_at,
                u.id AS author_id, u.username AS author_username,
                u.full_name AS author_full_name
            FROM pull_requests p
            INNER JOIN users u ON u.id = p.author_id
            WHERE p.repository_id = ? AND p.number = ?
            "#,
        )
        .bind(repository_id)
        .bind(number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound(format!("Pull request #{} not found", number))
            }
            e => DatabaseError::Query(e),
        })
    }

    pub async fn list_pull_requests(&self, repository_id: i64) -> Result<Vec<PullRequestRow>> {
        sqlx::query_as::<_, PullRequestRow>(
            r#"
            SELECT
                p.id, p.number, p.title, p.body, p.state, p.head_branch,
                p.base_branch, p.repository_id, p.created_at, p.closed_at,
                p.merged_at,
                u.id AS author_id, u.username AS author_username,
                u.full_name AS author_full_name
            FROM pull_requests p
            INNER JOIN users u ON u.id = p.author_id
            WHERE p.repository_id = ?
            ORDER BY p.created_at DESC, p.number DESC
            "#,
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    /// OPEN → CLOSED → OPEN and OPEN → MERGED. Merging is terminal: a merged
    /// pull request can be neither closed nor reopened. Re-asserting the
    /// current state is a no-op.
    pub async fn set_pull_request_state(
        &self,
        repository_id: i64,
        number: i64,
        state: PullRequestState,
    ) -> Result<PullRequestRow> {
        let changed = match state {
            PullRequestState::Open => sqlx::query(
                r#"
                UPDATE pull_requests
                SET state = 'OPEN', closed_at = NULL, updated_at = datetime('now')
                WHERE repository_id = ? AND number = ? AND state = 'CLOSED'
                "#,
            ),
            PullRequestState::Closed => sqlx::query(
                r#"
                UPDATE pull_requests
                SET state = 'CLOSED', closed_at = datetime('now'),
                    updated_at = datetime('now')
                WHERE repository_id = ? AND number = ? AND state = 'OPEN'
                "#,
            ),
            PullRequestState::Merged => sqlx::query(
                r#"
                UPDATE pull_requests
                SET state = 'MERGED', merged_at = datetime('now'),
                    updated_at = datetime('now')
                WHERE repository_id = ? AND number = ? AND state = 'OPEN'
                "#,
            ),
        }
        .bind(repository_id)
        .bind(number)
        .execute(&self.pool)
        .await?;

        let pull_request = self.get_pull_request(repository_id, number).await?;
        if changed.rows_affected() == 0 && pull_request.state != state.as_str() {
            return Err(DatabaseError::Conflict(format!(
                "Pull request #{} is {}",
                number,
                pull_request.state.to_lowercase()
            )));
        }
        Ok(pull_request)
    }

    // ========== Follow Operations ==========

    pub async fn follow_user(&self, follower_id: i64, following_id: i64) -> Result<()> {
        if follower_id == following_id {
            return Err(DatabaseError::InvalidData("Cannot follow yourself".to_string()));
        }

        sqlx::query("INSERT INTO follows (follower_id, following_id) VALUES (?, ?)")
            .bind(follower_id)
            .bind(following_id)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "Already following this user"))?;

        Ok(())
    }

    pub async fn unfollow_user(&self, follower_id: i64, following_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
            .bind(follower_id)
            .bind(following_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Not following this user".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::in_memory().await.expect("in-memory database")
    }

    async fn seed_user(db: &Database, username: &str) -> UserRow {
        db.create_user(
            username,
            &format!("{}@devit.com", username),
            &format!("{} Fullname", username),
            "not-a-real-hash",
        )
        .await
        .expect("seed user")
    }

    async fn star_rows(db: &Database, repository_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM stars WHERE repository_id = ?")
            .bind(repository_id)
            .fetch_one(&**db)
            .await
            .unwrap()
    }

    // ========== Users ==========

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let db = test_db().await;
        seed_user(&db, "demo").await;

        let err = db
            .create_user("other", "demo@devit.com", "Other", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let db = test_db().await;
        seed_user(&db, "demo").await;

        let err = db
            .create_user("demo", "fresh@devit.com", "Other", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let db = test_db().await;
        let err = db.get_user_by_username("ghost").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));

        // Email lookups report a miss as None, never NotFound.
        assert!(db.get_user_by_email("ghost@devit.com").await.unwrap().is_none());
    }

    // ========== Repositories ==========

    #[tokio::test]
    async fn repository_round_trip() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;

        let created = db
            .create_repository(owner.id, "my-project", "A demo project", true)
            .await
            .unwrap();
        assert_eq!(created.star_count, 0);
        assert_eq!(created.open_issues_count, 0);

        let fetched = db.find_repository(owner.id, "my-project").await.unwrap();
        assert_eq!(fetched.name, "my-project");
        assert_eq!(fetched.description, "A demo project");
        assert!(fetched.is_private);
    }

    #[tokio::test]
    async fn repository_name_unique_per_owner() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let other = seed_user(&db, "other").await;

        db.create_repository(owner.id, "dup", "", false).await.unwrap();
        let err = db.create_repository(owner.id, "dup", "", false).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));

        // Same name under a different owner is fine.
        db.create_repository(other.id, "dup", "", false).await.unwrap();
    }

    #[tokio::test]
    async fn missing_repository_is_not_found() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let err = db.find_repository(owner.id, "ghost").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn public_listing_filters_private_and_orders_by_stars() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let fan = seed_user(&db, "fan").await;

        let quiet = db.create_repository(owner.id, "quiet", "", false).await.unwrap();
        let hot = db.create_repository(owner.id, "hot", "", false).await.unwrap();
        db.create_repository(owner.id, "secret", "", true).await.unwrap();

        db.star_repository(fan.id, hot.id).await.unwrap();
        db.star_repository(owner.id, hot.id).await.unwrap();
        db.star_repository(fan.id, quiet.id).await.unwrap();

        let listing = db.list_public_repositories().await.unwrap();
        let names: Vec<&str> = listing.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["hot", "quiet"]);
        assert_eq!(listing[0].star_count, 2);
        assert_eq!(listing[0].owner_username, "demo");
    }

    // ========== Stars ==========

    #[tokio::test]
    async fn star_then_unstar_restores_the_counter() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let fan = seed_user(&db, "fan").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        db.star_repository(fan.id, repo.id).await.unwrap();
        let starred = db.find_repository(owner.id, "proj").await.unwrap();
        assert_eq!(starred.star_count, 1);
        assert_eq!(star_rows(&db, repo.id).await, 1);
        assert!(db.is_starred(fan.id, repo.id).await.unwrap());

        db.unstar_repository(fan.id, repo.id).await.unwrap();
        let unstarred = db.find_repository(owner.id, "proj").await.unwrap();
        assert_eq!(unstarred.star_count, 0);
        assert_eq!(star_rows(&db, repo.id).await, 0);
        assert!(!db.is_starred(fan.id, repo.id).await.unwrap());
    }

    #[tokio::test]
    async fn double_star_is_rejected_and_leaves_counter_alone() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let fan = seed_user(&db, "fan").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        db.star_repository(fan.id, repo.id).await.unwrap();
        let err = db.star_repository(fan.id, repo.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));

        // Counter still matches the row set: the failed attempt changed nothing.
        let repo = db.find_repository(owner.id, "proj").await.unwrap();
        assert_eq!(repo.star_count, 1);
        assert_eq!(star_rows(&db, repo.id).await, 1);
    }

    #[tokio::test]
    async fn unstar_without_star_is_rejected() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let fan = seed_user(&db, "fan").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        let err = db.unstar_repository(fan.id, repo.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
        assert_eq!(db.find_repository(owner.id, "proj").await.unwrap().star_count, 0);
    }

    // ========== Issues ==========

    #[tokio::test]
    async fn issue_numbers_are_sequential_from_one() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        for expected in 1..=3 {
            let issue = db
                .create_issue(repo.id, owner.id, &format!("issue {}", expected), "")
                .await
                .unwrap();
            assert_eq!(issue.number, expected);
            assert_eq!(issue.state, "OPEN");
        }

        let repo = db.find_repository(owner.id, "proj").await.unwrap();
        assert_eq!(repo.open_issues_count, 3);
    }

    #[tokio::test]
    async fn issue_numbers_are_scoped_per_repository() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let a = db.create_repository(owner.id, "a", "", false).await.unwrap();
        let b = db.create_repository(owner.id, "b", "", false).await.unwrap();

        db.create_issue(a.id, owner.id, "first in a", "").await.unwrap();
        let first_in_b = db.create_issue(b.id, owner.id, "first in b", "").await.unwrap();
        assert_eq!(first_in_b.number, 1);
    }

    #[tokio::test]
    async fn concurrent_issue_creation_never_collides() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        let (repo_id, owner_id) = (repo.id, owner.id);
        let (first, second) = tokio::join!(
            {
                let db = db.clone();
                async move { db.create_issue(repo_id, owner_id, "left", "").await }
            },
            {
                let db = db.clone();
                async move { db.create_issue(repo_id, owner_id, "right", "").await }
            },
        );

        let mut numbers = vec![first.unwrap().number, second.unwrap().number];
        numbers.sort_unstable();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn closing_and_reopening_adjusts_counter_and_closed_at() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();
        let issue = db.create_issue(repo.id, owner.id, "flaky test", "").await.unwrap();

        let closed = db
            .set_issue_state(repo.id, issue.number, IssueState::Closed)
            .await
            .unwrap();
        assert_eq!(closed.state, "CLOSED");
        assert!(closed.closed_at.is_some());
        assert_eq!(db.find_repository(owner.id, "proj").await.unwrap().open_issues_count, 0);

        // Closing an already-closed issue is a no-op.
        db.set_issue_state(repo.id, issue.number, IssueState::Closed).await.unwrap();
        assert_eq!(db.find_repository(owner.id, "proj").await.unwrap().open_issues_count, 0);

        let reopened = db
            .set_issue_state(repo.id, issue.number, IssueState::Open)
            .await
            .unwrap();
        assert_eq!(reopened.state, "OPEN");
        assert!(reopened.closed_at.is_none());
        assert_eq!(db.find_repository(owner.id, "proj").await.unwrap().open_issues_count, 1);
    }

    #[tokio::test]
    async fn concurrent_issue_creation_across_pooled_connections() {
        let path = std::env::temp_dir().join(format!(
            "devit-issues-{}-{}.db",
            std::process::id(),
            chrono::Utc::now().timestamp_micros(),
        ));
        let url = path.to_str().unwrap().to_string();
        let db = Database::new(&url).await.unwrap();

        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        // Each spawned task may run on its own pooled connection; writers
        // must queue rather than fail.
        let (repo_id, owner_id) = (repo.id, owner.id);
        let mut handles = Vec::new();
        for i in 0..4 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.create_issue(repo_id, owner_id, &format!("issue {}", i), "")
                    .await
            }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, vec![1, 2, 3, 4]);

        drop(db);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", url, suffix));
        }
    }

    #[tokio::test]
    async fn state_change_on_missing_issue_is_not_found() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        let err = db.set_issue_state(repo.id, 7, IssueState::Closed).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    // ========== Pull Requests ==========

    #[tokio::test]
    async fn pull_request_numbers_are_sequential_and_independent_of_issues() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        db.create_issue(repo.id, owner.id, "a bug", "").await.unwrap();
        db.create_issue(repo.id, owner.id, "another bug", "").await.unwrap();

        let first = db
            .create_pull_request(repo.id, owner.id, "fix the bug", "", "fix-bug", "main")
            .await
            .unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(first.state, "OPEN");
        assert_eq!(first.head_branch, "fix-bug");
        assert_eq!(first.base_branch, "main");

        let second = db
            .create_pull_request(repo.id, owner.id, "more fixes", "", "fix-more", "main")
            .await
            .unwrap();
        assert_eq!(second.number, 2);

        // Issue counter is untouched by pull requests.
        let repo = db.find_repository(owner.id, "proj").await.unwrap();
        assert_eq!(repo.open_issues_count, 2);
    }

    #[tokio::test]
    async fn merging_a_pull_request_is_terminal() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();
        let pr = db
            .create_pull_request(repo.id, owner.id, "feature", "", "feature", "main")
            .await
            .unwrap();

        let merged = db
            .set_pull_request_state(repo.id, pr.number, PullRequestState::Merged)
            .await
            .unwrap();
        assert_eq!(merged.state, "MERGED");
        assert!(merged.merged_at.is_some());

        // Re-asserting the merged state is a no-op.
        db.set_pull_request_state(repo.id, pr.number, PullRequestState::Merged)
            .await
            .unwrap();

        let err = db
            .set_pull_request_state(repo.id, pr.number, PullRequestState::Open)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));

        let err = db
            .set_pull_request_state(repo.id, pr.number, PullRequestState::Closed)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn closing_and_reopening_a_pull_request_tracks_closed_at() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();
        let pr = db
            .create_pull_request(repo.id, owner.id, "feature", "", "feature", "main")
            .await
            .unwrap();

        let closed = db
            .set_pull_request_state(repo.id, pr.number, PullRequestState::Closed)
            .await
            .unwrap();
        assert_eq!(closed.state, "CLOSED");
        assert!(closed.closed_at.is_some());
        assert!(closed.merged_at.is_none());

        let reopened = db
            .set_pull_request_state(repo.id, pr.number, PullRequestState::Open)
            .await
            .unwrap();
        assert_eq!(reopened.state, "OPEN");
        assert!(reopened.closed_at.is_none());
    }

    #[tokio::test]
    async fn missing_pull_request_is_not_found() {
        let db = test_db().await;
        let owner = seed_user(&db, "demo").await;
        let repo = db.create_repository(owner.id, "proj", "", false).await.unwrap();

        let err = db.get_pull_request(repo.id, 7).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));

        let err = db
            .set_pull_request_state(repo.id, 7, PullRequestState::Closed)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    // ========== Follows ==========

    #[tokio::test]
    async fn self_follow_is_invalid() {
        let db = test_db().await;
        let user = seed_user(&db, "demo").await;
        let err = db.follow_user(user.id, user.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidData(_)));
    }

    #[tokio::test]
    async fn duplicate_follow_is_a_conflict() {
        let db = test_db().await;
        let a = seed_user(&db, "a").await;
        let b = seed_user(&db, "b").await;

        db.follow_user(a.id, b.id).await.unwrap();
        let err = db.follow_user(a.id, b.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));

        // The reverse direction is its own pair.
        db.follow_user(b.id, a.id).await.unwrap();
    }

    #[tokio::test]
    async fn unfollow_without_follow_is_not_found() {
        let db = test_db().await;
        let a = seed_user(&db, "a").await;
        let b = seed_user(&db, "b").await;
        let err = db.unfollow_user(a.id, b.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn explore_users_counts_and_orders_by_repositories() {
        let db = test_db().await;
        let busy = seed_user(&db, "busy").await;
        let idle = seed_user(&db, "idle").await;

        db.create_repository(busy.id, "one", "", false).await.unwrap();
        db.create_repository(busy.id, "two", "", false).await.unwrap();
        db.follow_user(idle.id, busy.id).await.unwrap();

        let users = db.explore_users().await.unwrap();
        assert_eq!(users[0].username, "busy");
        assert_eq!(users[0].repository_count, 2);
        assert_eq!(users[0].follower_count, 1);
        assert_eq!(users[0].following_count, 0);
        assert_eq!(users[1].username, "idle");
        assert_eq!(users[1].following_count, 1);
    }

    #[tokio::test]
    async fn stats_count_all_entities() {
        let db = test_db().await;
        let user = seed_user(&db, "demo").await;
        let repo = db.create_repository(user.id, "proj", "", false).await.unwrap();
        db.create_issue(repo.id, user.id, "bug", "").await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.user_count, 1);
        assert_eq!(stats.repository_count, 1);
        assert_eq!(stats.issue_count, 1);
    }
}
