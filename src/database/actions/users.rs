use chrono::Duration;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
    },
    error::{Error, QueryError},
    form::{LoginForm, RegisterForm, SetPasswordForm, UserUpdateForm},
    pagination::PageRequest,
    schema::{User, UserProfile, UserRow, Uuid},
};

/// Maps a unique violation on `users` to the field it concerns.
fn user_conflict(error: QueryError) -> Error {
    if !error.is_unique_violation() {
        return error.into();
    }

    match error.constraint() {
        Some(constraint) if constraint.contains("email") => {
            Error::field("email", "A user with that email already exists.")
        }
        Some(constraint) if constraint.contains("username") => {
            Error::field("username", "A user with that username already exists.")
        }
        _ => Error::Conflict("User already exists".to_owned()),
    }
}

fn hash(password: &str) -> Result<String, Error> {
    hash_password(password).map_err(|e| Error::Internal(format!("Could not hash password: {e}")))
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Uuid) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_email(pool: &Pool<Postgres>, email: &str) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn list_profiles(
    pool: &Pool<Postgres>,
    user_ids: &[Uuid],
) -> Result<Vec<UserProfile>, Error> {
    if user_ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<UserProfile> = sqlx::query_as(
        "SELECT id, email, username, first_name, last_name FROM users WHERE id = ANY($1)",
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn fetch_users(
    request: PageRequest,
    pool: &Pool<Postgres>,
) -> Result<(Vec<UserProfile>, i64), Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT id, email, username, first_name, last_name, COUNT(*) OVER() AS count
        FROM users
        ORDER BY username
        LIMIT $1 OFFSET $2
    ",
    )
    .bind(request.limit)
    .bind(request.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    Ok((rows.into_iter().map(UserProfile::from).collect(), total_count))
}

/// Creates a user from an already validated form; the password is stored hashed.
pub async fn register_user(form: RegisterForm, pool: &Pool<Postgres>) -> Result<User, Error> {
    let password = hash(&form.password)?;

    let user: User = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(form.email.trim())
    .bind(form.username)
    .bind(form.first_name.trim())
    .bind(form.last_name.trim())
    .bind(password)
    .fetch_one(pool)
    .await
    .map_err(|e| user_conflict(QueryError::from(e)))?;

    log::info!("Registered user {} ({})", user.username, user.id);
    Ok(user)
}

pub async fn login_user(
    form: LoginForm,
    secret: &str,
    lifetime: Duration,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let user = get_user_by_email(pool, &form.email)
        .await?
        .ok_or(Error::InvalidCredentials)?;

    let authenticated = verify_password(&form.password, &user.password)
        .map_err(|e| Error::Internal(format!("Stored password hash is invalid: {e}")))?;
    if !authenticated {
        return Err(Error::InvalidCredentials);
    }

    generate_jwt_session(&user, secret, lifetime)
}

pub async fn update_user(
    user_id: Uuid,
    form: UserUpdateForm,
    pool: &Pool<Postgres>,
) -> Result<User, Error> {
    let user: Option<User> = sqlx::query_as(
        "
        UPDATE users SET
        email = COALESCE($1, email),
        username = COALESCE($2, username),
        first_name = COALESCE($3, first_name),
        last_name = COALESCE($4, last_name)
        WHERE id = $5
        RETURNING *
    ",
    )
    .bind(form.email.map(|email| email.trim().to_owned()))
    .bind(form.username)
    .bind(form.first_name.map(|name| name.trim().to_owned()))
    .bind(form.last_name.map(|name| name.trim().to_owned()))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| user_conflict(QueryError::from(e)))?;

    user.ok_or(Error::NotFound)
}

pub async fn set_password(
    user_id: Uuid,
    form: SetPasswordForm,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let user = get_user_by_id(pool, user_id).await?.ok_or(Error::NotFound)?;

    let authenticated = verify_password(&form.current_password, &user.password)
        .map_err(|e| Error::Internal(format!("Stored password hash is invalid: {e}")))?;
    if !authenticated {
        return Err(Error::field("current_password", "Invalid password."));
    }

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(hash(&form.new_password)?)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}
