//! Local credential store.
//!
//! Users live in a single SQLite table. Passwords are stored as
//! `hex(sha256(salt || password))` with a random 8-byte hex salt per user.
//! Authentication failures are distinguishable to the caller through
//! [`AuthError`] but render identically, so a response never reveals whether an
//! email is registered.

use std::sync::OnceLock;

use anyhow::anyhow;
use rand::RngCore;
use regex::Regex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

use crate::{now_s, open_db_connection};

const SALT_BYTES: usize = 8;

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("User already exists.")]
    AlreadyExists,
    #[error("credential store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials.")]
    NotFound,
    #[error("Invalid credentials.")]
    WrongPassword,
    #[error("credential store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for RegisterError {
    fn from(e: rusqlite::Error) -> Self {
        RegisterError::Store(e.into())
    }
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        AuthError::Store(e.into())
    }
}

/// What a successful login returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub email: String,
    pub full_name: String,
}

/// A row of the users table, minus secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub created_at: u64,
}

pub trait CredentialStore {
    fn register(&mut self, email: &str, password: &str, full_name: &str)
        -> Result<(), RegisterError>;

    fn authenticate(&mut self, email: &str, password: &str) -> Result<UserInfo, AuthError>;

    /// All users, newest first.
    fn list_users(&mut self) -> anyhow::Result<Vec<UserRecord>>;
}

pub struct SqliteCredentialStore {
    conn: Connection,
}

impl SqliteCredentialStore {
    /// Open (or create) the store. `db_path` may be a file path or a `file:` URI.
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        let conn = open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              email TEXT UNIQUE,
              full_name TEXT,
              salt TEXT,
              pwd_hash TEXT,
              created_at INTEGER
            );
            "#,
        )?;
        Ok(())
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn register(
        &mut self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<(), RegisterError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(RegisterError::InvalidInput("Email and password required."));
        }
        if !email_regex()?.is_match(&email) {
            return Err(RegisterError::InvalidInput("Email address is malformed."));
        }

        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(RegisterError::AlreadyExists);
        }

        let salt = new_salt();
        let pwd_hash = hash_password(&salt, password);
        let inserted = self.conn.execute(
            "INSERT INTO users (email, full_name, salt, pwd_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![email, full_name, salt, pwd_hash, now_s()? as i64],
        );
        match inserted {
            Ok(_) => {
                log::info!("registered user {}", email);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(RegisterError::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn authenticate(&mut self, email: &str, password: &str) -> Result<UserInfo, AuthError> {
        let email = normalize_email(email);
        let row: Option<(String, Option<String>, String, String)> = self
            .conn
            .query_row(
                "SELECT email, full_name, salt, pwd_hash FROM users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((email, full_name, salt, expected)) = row else {
            log::debug!("login for unknown user");
            return Err(AuthError::NotFound);
        };

        if !constant_time_eq(hash_password(&salt, password).as_bytes(), expected.as_bytes()) {
            log::debug!("login with wrong password for {}", email);
            return Err(AuthError::WrongPassword);
        }
        Ok(UserInfo {
            email,
            full_name: full_name.unwrap_or_default(),
        })
    }

    fn list_users(&mut self) -> anyhow::Result<Vec<UserRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, email, full_name, created_at FROM users ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(UserRecord {
                id: row.get(0)?,
                email: row.get(1)?,
                full_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                created_at: row.get::<_, Option<i64>>(3)?.unwrap_or(0).max(0) as u64,
            })
        })?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn email_regex() -> anyhow::Result<&'static Regex> {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+$").ok())
        .as_ref()
        .ok_or_else(|| anyhow!("email pattern failed to compile"))
}

fn new_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `hex(sha256(salt || password))`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut salted = Vec::with_capacity(salt.len() + password.len());
    salted.extend_from_slice(salt.as_bytes());
    salted.extend_from_slice(password.as_bytes());
    let digest = Sha256::digest(&salted);
    salted.zeroize();
    hex::encode(digest)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
