//! SQLite database layer (embedded, no external dependencies)

use anyhow::{Context, Result};
use async_trait::async_trait;
use roster_core::{
    ConflictField, GroupCreate, GroupDetail, GroupId, GroupSummary, GroupUpdate, Page,
    Repository, RosterError, User, UserCreate, UserDetail, UserId, UserUpdate,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

type RepoResult<T> = roster_core::Result<T>;

pub struct Database {
    pool: SqlitePool,
    /// Held for the life of every write transaction. A deferred transaction
    /// that reads first cannot upgrade to a writer once another connection
    /// has committed, and SQLite fails that upgrade without waiting.
    writer: Mutex<()>,
}

impl Database {
    pub async fn new(database_path: &Path) -> Result<Self> {
        info!("Opening SQLite database at: {}", database_path.display());

        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to SQLite database at: {}",
                    database_path.display()
                )
            })?;

        Self::from_pool(pool).await
    }

    /// Private database living as long as its single pooled connection
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        info!("SQLite connection established, running migrations...");

        Self::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database initialization complete");

        Ok(Self {
            pool,
            writer: Mutex::new(()),
        })
    }

    async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                number INTEGER UNIQUE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS "groups" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_groups (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                group_id INTEGER NOT NULL REFERENCES "groups"(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, group_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_user_groups_group ON user_groups (group_id)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Repository for Database {
    async fn list_users(&self, page: Page) -> RepoResult<Vec<User>> {
        debug!("Listing users: skip={}, limit={}", page.skip, page.limit);

        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, number FROM users
            ORDER BY id
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(i64::from(page.limit))
        .bind(i64::from(page.skip))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn get_user(&self, id: UserId) -> RepoResult<UserDetail> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let detail = user_detail(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(detail)
    }

    async fn create_user(&self, req: &UserCreate) -> RepoResult<User> {
        let _writer = self.write_lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        for &group_id in req.group_ids() {
            if fetch_group(&mut tx, group_id).await?.is_none() {
                return Err(RosterError::GroupIdNotFound(group_id));
            }
        }

        let id = sqlx::query(
            r#"
            INSERT INTO users (username, number) VALUES (?1, ?2)
            "#,
        )
        .bind(&req.username)
        .bind(req.number)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .last_insert_rowid();

        for &group_id in req.group_ids() {
            insert_membership(&mut tx, group_id, id).await?;
        }

        tx.commit().await.map_err(map_sqlx)?;

        info!(
            "Created user: id={}, username={}, groups={:?}",
            id,
            req.username,
            req.group_ids()
        );

        Ok(User {
            id,
            username: req.username.clone(),
            number: req.number,
        })
    }

    async fn update_user(&self, id: UserId, req: &UserUpdate) -> RepoResult<UserDetail> {
        let _writer = self.write_lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let updated = sqlx::query(
            r#"
            UPDATE users SET username = ?1, number = ?2 WHERE id = ?3
            "#,
        )
        .bind(&req.username)
        .bind(req.number)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .rows_affected();

        if updated == 0 {
            return Err(RosterError::UserNotFound);
        }

        let detail = user_detail(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx)?;

        info!("Updated user: id={}, username={}", id, req.username);

        Ok(detail)
    }

    async fn delete_user(&self, id: UserId) -> RepoResult<User> {
        let _writer = self.write_lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let user = fetch_user(&mut tx, id)
            .await?
            .ok_or(RosterError::UserNotFound)?;

        sqlx::query(
            r#"
            DELETE FROM user_groups WHERE user_id = ?1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            DELETE FROM users WHERE id = ?1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;

        info!("Deleted user: id={}", id);

        Ok(user)
    }

    async fn list_groups(&self, page: Page) -> RepoResult<Vec<GroupDetail>> {
        debug!("Listing groups: skip={}, limit={}", page.skip, page.limit);

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let rows: Vec<GroupRow> = sqlx::query_as(
            r#"
            SELECT id, name FROM "groups"
            ORDER BY id
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(i64::from(page.limit))
        .bind(i64::from(page.skip))
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let users = members_of(&mut tx, row.id).await?;
            groups.push(GroupDetail {
                id: row.id,
                name: row.name,
                users,
            });
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(groups)
    }

    async fn get_group(&self, id: GroupId) -> RepoResult<GroupDetail> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let detail = group_detail(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(detail)
    }

    async fn create_group(&self, req: &GroupCreate) -> RepoResult<GroupDetail> {
        let _writer = self.write_lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        for &user_id in req.user_ids() {
            if fetch_user(&mut tx, user_id).await?.is_none() {
                return Err(RosterError::UserIdNotFound(user_id));
            }
        }

        let id = sqlx::query(
            r#"
            INSERT INTO "groups" (name) VALUES (?1)
            "#,
        )
        .bind(&req.name)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .last_insert_rowid();

        for &user_id in req.user_ids() {
            insert_membership(&mut tx, id, user_id).await?;
        }

        let detail = group_detail(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx)?;

        info!(
            "Created group: id={}, name={}, users={:?}",
            id,
            req.name,
            req.user_ids()
        );

        Ok(detail)
    }

    async fn update_group_members(
        &self,
        id: GroupId,
        req: &GroupUpdate,
    ) -> RepoResult<GroupDetail> {
        let _writer = self.write_lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        if fetch_group(&mut tx, id).await?.is_none() {
            return Err(RosterError::GroupNotFound);
        }

        for user_id in req.referenced_users() {
            if fetch_user(&mut tx, user_id).await?.is_none() {
                return Err(RosterError::UserIdNotFound(user_id));
            }
        }

        for &user_id in req.add_users() {
            insert_membership(&mut tx, id, user_id).await?;
        }
        for &user_id in req.remove_users() {
            delete_membership(&mut tx, id, user_id).await?;
        }

        let detail = group_detail(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx)?;

        info!(
            "Updated group members: id={}, added={:?}, removed={:?}",
            id,
            req.add_users(),
            req.remove_users()
        );

        Ok(detail)
    }

    async fn delete_group(&self, id: GroupId) -> RepoResult<GroupDetail> {
        let _writer = self.write_lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let snapshot = group_detail(&mut tx, id).await?;

        sqlx::query(
            r#"
            DELETE FROM user_groups WHERE group_id = ?1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            DELETE FROM "groups" WHERE id = ?1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;

        info!(
            "Deleted group: id={}, members={}",
            id,
            snapshot.users_count()
        );

        Ok(snapshot)
    }

    async fn add_membership(&self, group_id: GroupId, user_id: UserId) -> RepoResult<GroupDetail> {
        let _writer = self.write_lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        if fetch_group(&mut tx, group_id).await?.is_none() {
            return Err(RosterError::GroupNotFound);
        }
        if fetch_user(&mut tx, user_id).await?.is_none() {
            return Err(RosterError::UserNotFound);
        }

        let inserted = insert_membership(&mut tx, group_id, user_id).await?;
        let detail = group_detail(&mut tx, group_id).await?;
        tx.commit().await.map_err(map_sqlx)?;

        if inserted {
            info!("Added user {} to group {}", user_id, group_id);
        } else {
            debug!("User {} already in group {}", user_id, group_id);
        }

        Ok(detail)
    }

    async fn remove_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> RepoResult<GroupDetail> {
        let _writer = self.write_lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        if fetch_group(&mut tx, group_id).await?.is_none() {
            return Err(RosterError::GroupNotFound);
        }
        if fetch_user(&mut tx, user_id).await?.is_none() {
            return Err(RosterError::UserNotFound);
        }

        let removed = delete_membership(&mut tx, group_id, user_id).await?;
        let detail = group_detail(&mut tx, group_id).await?;
        tx.commit().await.map_err(map_sqlx)?;

        if removed {
            info!("Removed user {} from group {}", user_id, group_id);
        } else {
            debug!("User {} was not in group {}", user_id, group_id);
        }

        Ok(detail)
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

async fn fetch_user(conn: &mut SqliteConnection, id: UserId) -> RepoResult<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(
        r#"
        SELECT id, username, number FROM users WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    Ok(row.map(User::from))
}

async fn fetch_group(conn: &mut SqliteConnection, id: GroupId) -> RepoResult<Option<GroupSummary>> {
    let row: Option<GroupRow> = sqlx::query_as(
        r#"
        SELECT id, name FROM "groups" WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    Ok(row.map(GroupSummary::from))
}

async fn members_of(conn: &mut SqliteConnection, group_id: GroupId) -> RepoResult<Vec<User>> {
    let rows: Vec<UserRow> = sqlx::query_as(
        r#"
        SELECT u.id, u.username, u.number
        FROM users u
        JOIN user_groups ug ON ug.user_id = u.id
        WHERE ug.group_id = ?1
        ORDER BY u.id
        "#,
    )
    .bind(group_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    Ok(rows.into_iter().map(User::from).collect())
}

async fn groups_of(conn: &mut SqliteConnection, user_id: UserId) -> RepoResult<Vec<GroupSummary>> {
    let rows: Vec<GroupRow> = sqlx::query_as(
        r#"
        SELECT g.id, g.name
        FROM "groups" g
        JOIN user_groups ug ON ug.group_id = g.id
        WHERE ug.user_id = ?1
        ORDER BY g.id
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    Ok(rows.into_iter().map(GroupSummary::from).collect())
}

async fn user_detail(conn: &mut SqliteConnection, id: UserId) -> RepoResult<UserDetail> {
    let user = fetch_user(conn, id)
        .await?
        .ok_or(RosterError::UserNotFound)?;
    let groups = groups_of(conn, id).await?;
    Ok(UserDetail { user, groups })
}

async fn group_detail(conn: &mut SqliteConnection, id: GroupId) -> RepoResult<GroupDetail> {
    let group = fetch_group(conn, id)
        .await?
        .ok_or(RosterError::GroupNotFound)?;
    let users = members_of(conn, id).await?;
    Ok(GroupDetail {
        id: group.id,
        name: group.name,
        users,
    })
}

/// Returns whether a new row was written
async fn insert_membership(
    conn: &mut SqliteConnection,
    group_id: GroupId,
    user_id: UserId,
) -> RepoResult<bool> {
    let affected = sqlx::query(
        r#"
        INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)
        "#,
    )
    .bind(user_id)
    .bind(group_id)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?
    .rows_affected();

    Ok(affected > 0)
}

/// Returns whether a row was removed
async fn delete_membership(
    conn: &mut SqliteConnection,
    group_id: GroupId,
    user_id: UserId,
) -> RepoResult<bool> {
    let affected = sqlx::query(
        r#"
        DELETE FROM user_groups WHERE user_id = ?1 AND group_id = ?2
        "#,
    )
    .bind(user_id)
    .bind(group_id)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?
    .rows_affected();

    Ok(affected > 0)
}

/// Unique violations become conflicts on the offending column.
fn map_sqlx(err: sqlx::Error) -> RosterError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            let field = if message.contains("users.username") {
                Some(ConflictField::Username)
            } else if message.contains("users.number") {
                Some(ConflictField::Number)
            } else if message.contains("groups.name") {
                Some(ConflictField::GroupName)
            } else {
                None
            };
            if let Some(field) = field {
                return RosterError::Conflict(field);
            }
        }
    }
    RosterError::Storage(err.to_string())
}

// Helper structs for sqlx query_as
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    number: Option<i64>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            username: r.username,
            number: r.number,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
}

impl From<GroupRow> for GroupSummary {
    fn from(r: GroupRow) -> Self {
        GroupSummary {
            id: r.id,
            name: r.name,
        }
    }
}
