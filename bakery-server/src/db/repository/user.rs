//! User Repository

use shared::models::{ProfileUpdate, Role, User};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

use super::{RepoError, RepoResult};

const USER_SELECT: &str =
    "SELECT id, name, email, hash_pass, role, phone, address, created_at, updated_at FROM user";

/// Insert payload — the password is already hashed by the caller
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub hash_pass: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<User>> {
    let sql = format!("{USER_SELECT} WHERE id = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> RepoResult<Option<User>> {
    let sql = format!("{USER_SELECT} WHERE email = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn create(pool: &SqlitePool, data: NewUser) -> RepoResult<User> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO user (id, name, email, hash_pass, role, phone, address, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&data.name)
    .bind(&data.email)
    .bind(&data.hash_pass)
    .bind(data.role)
    .bind(&data.phone)
    .bind(&data.address)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create user".into()))
}

pub async fn update_profile(
    pool: &SqlitePool,
    id: i64,
    data: &ProfileUpdate,
) -> RepoResult<User> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE user SET name = COALESCE(?1, name), phone = COALESCE(?2, phone), \
         address = COALESCE(?3, address), updated_at = ?4 WHERE id = ?5",
    )
    .bind(&data.name)
    .bind(&data.phone)
    .bind(&data.address)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("User {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("User {id} not found")))
}

/// Startup bootstrap: create the admin account if it doesn't exist yet.
/// Registration never produces admins, this is the only path.
pub async fn ensure_admin(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    hash_pass: &str,
) -> RepoResult<User> {
    if let Some(existing) = find_by_email(pool, email).await? {
        return Ok(existing);
    }
    tracing::info!(email = %email, "Creating bootstrap admin account");
    create(
        pool,
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            hash_pass: hash_pass.to_string(),
            role: Role::Admin,
            phone: None,
            address: None,
        },
    )
    .await
}
