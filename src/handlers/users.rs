//! Registration, activation, authentication tokens and user administration.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::util::{JsonBody, ResourceId};
use crate::error::{AppError, AppResult};
use crate::filters::{Filters, ListSpec, QueryParams};
use crate::mailer::Email;
use crate::models::{
    ActivateUserRequest, CreateTokenRequest, Permission, RegisterUserRequest, Scope,
    UpdatePasswordRequest, UpdateUserRequest, User, hash_password, verify_dummy_password,
    verify_password,
};
use crate::state::AppState;
use crate::store::{StoreError, text_matches};
use crate::validation::Validator;

const USERS: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &["id", "username", "fname", "lname", "email"],
};

fn duplicate_email(err: StoreError) -> AppError {
    match err {
        StoreError::Duplicate => {
            AppError::field("email", "a user with this email address already exists")
        }
        other => other.into(),
    }
}

/// Register a user, grant the default permission and mail an activation token.
#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterUserRequest>,
) -> AppResult<Response> {
    let mut user = User {
        id: 0,
        regulation_number: body.regulation_number,
        username: body.username,
        fname: body.fname,
        lname: body.lname,
        email: body.email,
        gender: body.gender,
        formation: body.formation,
        rank: body.rank,
        postings: body.postings,
        password_hash: String::new(),
        activated: false,
        version: 0,
        created_at: Utc::now(),
    };

    let mut v = Validator::new();
    user.validate(&mut v);
    v.password("password", &body.password);
    v.finish()?;

    user.password_hash = hash_password(body.password).await?;
    let user = state.db.users.insert(user).map_err(duplicate_email)?;
    state.db.permissions.grant(user.id, Permission::DEFAULT_GRANT)?;

    let token = state
        .db
        .tokens
        .issue(user.id, state.config.activation_ttl, Scope::Activation)?;

    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    let email = Email::Welcome {
        user_id: user.id,
        activation_token: token.plaintext,
    };
    state.background("welcome_email", async move {
        mailer.send(&recipient, &email).await
    });

    info!(user_id = user.id, "User registered");
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))).into_response())
}

/// Activate the account owning an activation token.
#[instrument(skip(state, body))]
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ActivateUserRequest>,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    v.token_plaintext("token", &body.token);
    v.finish()?;

    let mut user = match state.db.user_for_token(Scope::Activation, &body.token) {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(AppError::field("token", "invalid or expired activation token"));
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    let user = state.db.users.update(&user)?;
    state
        .db
        .tokens
        .delete_scope_for_user(Scope::Activation, user.id)?;

    info!(user_id = user.id, "User activated");
    Ok(Json(json!({ "user": user })))
}

/// Exchange email and password for an authentication token.
#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateTokenRequest>,
) -> AppResult<Response> {
    let mut v = Validator::new();
    v.email("email", &body.email);
    v.password("password", &body.password);
    v.finish()?;

    let email = body.email.to_lowercase();
    let Some(user) = state.db.users.find(|u| u.email.to_lowercase() == email)? else {
        verify_dummy_password(body.password).await?;
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(body.password, user.password_hash.clone()).await? {
        return Err(AppError::InvalidCredentials);
    }

    let token = state
        .db
        .tokens
        .issue(user.id, state.config.token_ttl, Scope::Authentication)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    )
        .into_response())
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    JsonBody(body): JsonBody<UpdateUserRequest>,
) -> AppResult<Json<Value>> {
    let mut user = state.db.users.get(id)?;
    body.apply(&mut user);

    let mut v = Validator::new();
    user.validate(&mut v);
    v.finish()?;

    let user = state.db.users.update(&user).map_err(duplicate_email)?;
    Ok(Json(json!({ "user": user })))
}

/// List users, filtered on `username` and `email`.
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    query: QueryParams,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let username = query.text("username");
    let email = query.text("email");
    let filters = Filters::parse(&query, &USERS, &mut v);
    v.finish()?;

    let (users, metadata) = state.db.users.list(&filters, |u| {
        text_matches(&u.username, username) && text_matches(&u.email, email)
    })?;

    Ok(Json(json!({ "users": users, "@metadata": metadata })))
}

/// Delete a user along with its tokens, permissions and role assignments.
#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    state.db.delete_user(id)?;
    info!(user_id = id, "User deleted");
    Ok(Json(json!({ "message": "user successfully deleted" })))
}

#[instrument(skip(state, body))]
pub async fn update_password(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    JsonBody(body): JsonBody<UpdatePasswordRequest>,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    v.password("password", &body.password);
    v.finish()?;

    let mut user = state.db.users.get(id)?;
    user.password_hash = hash_password(body.password).await?;
    state.db.users.update(&user)?;

    Ok(Json(json!({ "message": "password updated successfully" })))
}
