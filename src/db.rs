use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, SqlitePool,
};

use crate::{xp::level_for, AppError, AppResult};

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        role TEXT NOT NULL,
        xp INTEGER NOT NULL DEFAULT 0 CHECK (xp >= 0),
        level INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS chats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        room TEXT NOT NULL,
        sender TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS chats_by_room ON chats (room, created_at, id)",
    "CREATE TABLE IF NOT EXISTS ai_conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        user_message TEXT NOT NULL,
        ai_response TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user_profiles (
        username TEXT PRIMARY KEY,
        nickname TEXT NOT NULL
    )",
];

const SEED_USERS: [(&str, Role); 5] = [
    ("student1", Role::Student),
    ("monitor1", Role::Monitor),
    ("teacher1", Role::Teacher),
    ("moderator1", Role::Moderator),
    ("head1", Role::Head),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Monitor,
    Teacher,
    Moderator,
    Head,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        use Role::*;
        match self {
            Student => "student",
            Monitor => "monitor",
            Teacher => "teacher",
            Moderator => "moderator",
            Head => "head",
        }
    }

    pub fn can_toggle_lock(&self) -> bool {
        matches!(self, Role::Moderator | Role::Head)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Role::*;
        match s {
            "student" => Ok(Student),
            "monitor" => Ok(Monitor),
            "teacher" => Ok(Teacher),
            "moderator" => Ok(Moderator),
            "head" => Ok(Head),
            other => Err(anyhow::anyhow!("unknown role {other:?} in users table").into()),
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    username: String,
    role: String,
    xp: i64,
    level: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    pub role: Role,
    pub xp: i64,
    pub level: i64,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(UserRow { username, role, xp, level }: UserRow) -> AppResult<Self> {
        Ok(User {
            username,
            role: role.parse()?,
            xp,
            level,
        })
    }
}

/// Opens a pool on `url`, creating the database file when missing.
/// In-memory databases are per connection, so they get exactly one.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let max_connections = if url.contains(":memory:") { 1 } else { max_connections };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Creates missing tables and provisions the seed users.
pub async fn init(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }

    for (username, role) in SEED_USERS {
        provision_user(db_pool, username, username, role, 0).await?;
    }

    tracing::debug!("schema ready, {} seed users provisioned", SEED_USERS.len());
    Ok(())
}

/// Inserts a user unless the username is taken. Returns whether a row was added.
pub async fn provision_user(
    db_pool: &SqlitePool,
    username: &str,
    password: &str,
    role: Role,
    xp: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO users (username,password,role,xp,level) VALUES (?,?,?,?,?)")
        .bind(username)
        .bind(password)
        .bind(role.as_str())
        .bind(xp)
        .bind(level_for(xp))
        .execute(db_pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn find_user(db_pool: &SqlitePool, username: &str) -> AppResult<Option<User>> {
    sqlx::query_as::<_, UserRow>("SELECT username,role,xp,level FROM users WHERE username=?")
        .bind(username)
        .fetch_optional(db_pool)
        .await?
        .map(User::try_from)
        .transpose()
}

pub async fn find_user_with_password(
    db_pool: &SqlitePool,
    username: &str,
    password: &str,
) -> AppResult<Option<User>> {
    sqlx::query_as::<_, UserRow>("SELECT username,role,xp,level FROM users WHERE username=? AND password=?")
        .bind(username)
        .bind(password)
        .fetch_optional(db_pool)
        .await?
        .map(User::try_from)
        .transpose()
}
