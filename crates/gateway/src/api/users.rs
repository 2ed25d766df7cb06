//! Account registration, login, and profile endpoints.
//!
//! Accounts live in the gateway's own store; registration also announces
//! the new user to the simulation so it can spawn their starting units.

use std::{collections::HashMap, sync::Arc};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Extension, State},
    middleware,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::error;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtAccessTokenService,
        middleware::{require_bearer_auth, AuthenticatedUser},
    },
    error::{ErrorCode, GatewayError},
    queen::{QueenBackend, QueenError},
};

const STARTING_LEVEL: u32 = 1;

#[derive(Clone)]
pub struct UsersApiState {
    pub store: UserStore,
    pub jwt: Arc<JwtAccessTokenService>,
    pub queen: QueenBackend,
}

pub fn router(state: UsersApiState) -> Router {
    let jwt = Arc::clone(&state.jwt);

    let protected = Router::new()
        .route("/v1/users/myself", get(myself))
        .layer(middleware::from_fn_with_state(jwt, require_bearer_auth));

    Router::new()
        .route("/v1/users/register", post(register))
        .route("/v1/users/token", post(token))
        .merge(protected)
        .with_state(state)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub pw: String,
    pub token: Option<String>,
}

#[derive(Debug)]
pub enum CreateUserError {
    UsernameTaken,
    EmailTaken,
    Other(anyhow::Error),
}

/// User account storage, either durable Postgres or an in-process map
/// for tests and queen-less development.
#[derive(Clone)]
pub enum UserStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<HashMap<Uuid, UserRecord>>>),
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    async fn create_user(&self, record: UserRecord) -> Result<(), CreateUserError> {
        match self {
            Self::Postgres(pool) => {
                let result = sqlx::query(
                    "INSERT INTO user_account (id, username, display_name, email, pw)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(record.id)
                .bind(&record.username)
                .bind(&record.display_name)
                .bind(&record.email)
                .bind(&record.pw)
                .execute(pool)
                .await;

                result.map(|_| ()).map_err(map_create_error)
            }
            Self::Memory(users) => {
                let mut users = users.write().await;
                if users.values().any(|existing| existing.username == record.username) {
                    return Err(CreateUserError::UsernameTaken);
                }
                if users.values().any(|existing| existing.email == record.email) {
                    return Err(CreateUserError::EmailTaken);
                }
                users.insert(record.id, record);
                Ok(())
            }
        }
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<UserRecord>> {
        match self {
            Self::Postgres(pool) => {
                let record = sqlx::query_as::<_, UserRecord>(
                    "SELECT id, username, display_name, email, pw, token
                     FROM user_account WHERE username = $1",
                )
                .bind(username)
                .fetch_optional(pool)
                .await?;
                Ok(record)
            }
            Self::Memory(users) => {
                let users = users.read().await;
                Ok(users.values().find(|record| record.username == username).cloned())
            }
        }
    }

    async fn find_by_id(&self, user_id: Uuid) -> anyhow::Result<Option<UserRecord>> {
        match self {
            Self::Postgres(pool) => {
                let record = sqlx::query_as::<_, UserRecord>(
                    "SELECT id, username, display_name, email, pw, token
                     FROM user_account WHERE id = $1",
                )
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
                Ok(record)
            }
            Self::Memory(users) => {
                let users = users.read().await;
                Ok(users.get(&user_id).cloned())
            }
        }
    }

    async fn save_token(&self, user_id: Uuid, token: &str) -> anyhow::Result<()> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("UPDATE user_account SET token = $2 WHERE id = $1")
                    .bind(user_id)
                    .bind(token)
                    .execute(pool)
                    .await?;
                Ok(())
            }
            Self::Memory(users) => {
                let mut users = users.write().await;
                if let Some(record) = users.get_mut(&user_id) {
                    record.token = Some(token.to_owned());
                }
                Ok(())
            }
        }
    }
}

fn map_create_error(error: sqlx::Error) -> CreateUserError {
    if let Some(database_error) = error.as_database_error() {
        match database_error.constraint() {
            Some("username_is_unique") => return CreateUserError::UsernameTaken,
            Some("email_is_unique") => return CreateUserError::EmailTaken,
            _ => {}
        }
    }

    CreateUserError::Other(error.into())
}

#[derive(Debug, Deserialize)]
struct RegisterForm {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ProfileResponse {
    user_id: Uuid,
    username: String,
    displayname: String,
    email: String,
}

fn validate_register_form(form: &RegisterForm) -> Result<(), GatewayError> {
    let validation_error = |message: &str| {
        GatewayError::new(ErrorCode::ValidationFailed, message.to_owned())
    };

    if form.username.len() < 3 || form.username.len() > 125 {
        return Err(validation_error("username must be between 3 and 125 characters"));
    }
    if !form.email.contains('@') {
        return Err(validation_error("email address is not valid"));
    }
    if form.password.len() < 8 || form.password.len() > 125 {
        return Err(validation_error("password must be between 8 and 125 characters"));
    }

    Ok(())
}

fn hash_password(password: &str) -> Result<String, GatewayError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| {
            error!(%error, "password hashing failed");
            GatewayError::from_code(ErrorCode::InternalError)
        })
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

fn internal_error(error: anyhow::Error) -> GatewayError {
    error!(%error, "user store operation failed");
    GatewayError::from_code(ErrorCode::InternalError)
}

async fn issue_and_persist_token(
    state: &UsersApiState,
    user_id: Uuid,
) -> Result<Json<TokenResponse>, GatewayError> {
    let access_token = state.jwt.issue_token(user_id).map_err(internal_error)?;
    state.store.save_token(user_id, &access_token).await.map_err(internal_error)?;
    Ok(Json(TokenResponse { access_token, token_type: "bearer" }))
}

async fn register(
    State(state): State<UsersApiState>,
    Json(form): Json<RegisterForm>,
) -> Result<Json<TokenResponse>, GatewayError> {
    validate_register_form(&form)?;

    let user_id = Uuid::new_v4();
    let record = UserRecord {
        id: user_id,
        username: form.username.clone(),
        display_name: form.display_name.unwrap_or_else(|| form.username.clone()),
        email: form.email,
        pw: hash_password(&form.password)?,
        token: None,
    };

    state.store.create_user(record).await.map_err(|error| match error {
        CreateUserError::UsernameTaken => GatewayError::from_code(ErrorCode::UsernameTaken),
        CreateUserError::EmailTaken => GatewayError::from_code(ErrorCode::EmailTaken),
        CreateUserError::Other(error) => internal_error(error),
    })?;

    // Without a simulation-side registration the account cannot play, so
    // surface the failure instead of handing out a token.
    state.queen.register_user(user_id, STARTING_LEVEL).await.map_err(|error| {
        if let QueenError::Call(status) = &error {
            error!(%status, "failed to register user with the simulation");
        }
        GatewayError::from_code(ErrorCode::QueenUnavailable)
    })?;

    issue_and_persist_token(&state, user_id).await
}

async fn token(
    State(state): State<UsersApiState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, GatewayError> {
    let invalid_credentials =
        || GatewayError::new(ErrorCode::AuthInvalidToken, "invalid username or password");

    let record = state
        .store
        .find_by_username(&form.username)
        .await
        .map_err(internal_error)?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&form.password, &record.pw) {
        return Err(invalid_credentials());
    }

    issue_and_persist_token(&state, record.id).await
}

async fn myself(
    State(state): State<UsersApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<ProfileResponse>, GatewayError> {
    let record = state
        .store
        .find_by_id(user.user_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| GatewayError::from_code(ErrorCode::NotFound))?;

    Ok(Json(ProfileResponse {
        user_id: record.id,
        username: record.username,
        displayname: record.display_name,
        email: record.email,
    }))
}
