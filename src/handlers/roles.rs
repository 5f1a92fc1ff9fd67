//! Roles and the assignment of roles to users.

use axum::Json;
use axum::extract::State;
use axum::response::Response;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::util::{JsonBody, ResourceId, created};
use crate::error::{AppError, AppResult};
use crate::filters::{Filters, ListSpec, QueryParams};
use crate::models::{
    AssignRoleRequest, ChangeRoleRequest, RevokeRoleRequest, Role, RoleRequest, User, UserRole,
    UserWithRoles,
};
use crate::state::AppState;
use crate::store::{Database, StoreError, text_matches};
use crate::validation::Validator;

const ROLES: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &["id", "role"],
};

const USERS_WITH_ROLES: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &["id", "username"],
};

// =============================================================================
// Roles
// =============================================================================

#[instrument(skip(state, body))]
pub async fn create_role(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RoleRequest>,
) -> AppResult<Response> {
    let role = Role { id: 0, role: body.role };

    let mut v = Validator::new();
    role.validate(&mut v);
    v.finish()?;

    let role = state.db.roles.insert(role)?;
    Ok(created(format!("/v1/roles/{}", role.id), json!({ "role": role })))
}

#[instrument(skip(state))]
pub async fn show_role(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    let role = state.db.roles.get(id)?;
    Ok(Json(json!({ "role": role })))
}

#[instrument(skip(state, body))]
pub async fn update_role(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    JsonBody(body): JsonBody<RoleRequest>,
) -> AppResult<Json<Value>> {
    let mut role = state.db.roles.get(id)?;
    role.role = body.role;

    let mut v = Validator::new();
    role.validate(&mut v);
    v.finish()?;

    let role = state.db.roles.update(&role)?;
    Ok(Json(json!({ "role": role })))
}

/// Delete a role; its assignments go with it.
#[instrument(skip(state))]
pub async fn delete_role(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    state.db.roles.delete(id)?;
    state.db.user_roles.delete_where(|ur| ur.role_id == id)?;
    Ok(Json(json!({ "message": "role successfully deleted" })))
}

#[instrument(skip(state))]
pub async fn list_roles(
    State(state): State<AppState>,
    query: QueryParams,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let name = query.text("role");
    let filters = Filters::parse(&query, &ROLES, &mut v);
    v.finish()?;

    let (roles, metadata) = state
        .db
        .roles
        .list(&filters, |r| text_matches(&r.role, name))?;

    Ok(Json(json!({ "roles": roles, "@metadata": metadata })))
}

// =============================================================================
// User Roles
// =============================================================================

/// Names of the roles held by `user_id`, ordered by role id.
fn role_names(db: &Database, user_id: i64) -> Result<Vec<String>, StoreError> {
    let mut role_ids: Vec<i64> = db
        .user_roles
        .select(|ur| ur.user_id == user_id)?
        .into_iter()
        .map(|ur| ur.role_id)
        .collect();
    role_ids.sort_unstable();

    let mut names = Vec::with_capacity(role_ids.len());
    for role_id in role_ids {
        match db.roles.get(role_id) {
            Ok(role) => names.push(role.role),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(names)
}

fn with_roles(db: &Database, user: &User) -> Result<UserWithRoles, StoreError> {
    Ok(UserWithRoles {
        id: user.id,
        name: user.full_name(),
        roles: role_names(db, user.id)?,
    })
}

/// Record a field error when `id` does not name a stored row.
fn check_exists(
    v: &mut Validator,
    key: &str,
    id: i64,
    lookup: Result<(), StoreError>,
) -> AppResult<()> {
    if id < 1 {
        return Ok(());
    }
    match lookup {
        Ok(()) => Ok(()),
        Err(StoreError::NotFound) => {
            v.add_error(key, "must refer to an existing record");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state, body))]
pub async fn assign_role(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<AssignRoleRequest>,
) -> AppResult<Response> {
    let mut v = Validator::new();
    v.positive_id("user_id", body.user_id);
    v.positive_id("role_id", body.role_id);
    check_exists(
        &mut v,
        "user_id",
        body.user_id,
        state.db.users.get(body.user_id).map(drop),
    )?;
    check_exists(
        &mut v,
        "role_id",
        body.role_id,
        state.db.roles.get(body.role_id).map(drop),
    )?;
    v.finish()?;

    let assignment = state
        .db
        .user_roles
        .insert(UserRole {
            id: 0,
            user_id: body.user_id,
            role_id: body.role_id,
        })
        .map_err(|e| match e {
            StoreError::Duplicate => AppError::Conflict("the user already has this role".to_string()),
            other => other.into(),
        })?;

    info!(user_id = body.user_id, role_id = body.role_id, "Role assigned");
    Ok(created(
        format!("/v1/users/user_roles/{}", body.user_id),
        json!({ "user_role": assignment }),
    ))
}

/// Roles held by one user; a user holding none is reported as not found.
#[instrument(skip(state))]
pub async fn user_roles(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> AppResult<Json<Value>> {
    let user = state.db.users.get(id)?;
    let user = with_roles(&state.db, &user)?;
    if user.roles.is_empty() {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "user": user })))
}

#[instrument(skip(state, body))]
pub async fn change_user_role(
    State(state): State<AppState>,
    ResourceId(user_id): ResourceId,
    JsonBody(body): JsonBody<ChangeRoleRequest>,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    v.positive_id("old_role_id", body.old_role_id);
    v.positive_id("new_role_id", body.new_role_id);
    check_exists(
        &mut v,
        "new_role_id",
        body.new_role_id,
        state.db.roles.get(body.new_role_id).map(drop),
    )?;
    v.finish()?;

    let mut assignment = state
        .db
        .user_roles
        .find(|ur| ur.user_id == user_id && ur.role_id == body.old_role_id)?
        .ok_or(AppError::NotFound)?;

    assignment.role_id = body.new_role_id;
    state.db.user_roles.update(&assignment).map_err(|e| match e {
        StoreError::Duplicate => AppError::Conflict("the user already has this role".to_string()),
        other => other.into(),
    })?;

    Ok(Json(json!({
        "message": format!("user {user_id} role updated successfully")
    })))
}

#[instrument(skip(state, body))]
pub async fn revoke_user_role(
    State(state): State<AppState>,
    ResourceId(user_id): ResourceId,
    JsonBody(body): JsonBody<RevokeRoleRequest>,
) -> AppResult<Json<Value>> {
    let role_id = body.role_id;
    let removed = state
        .db
        .user_roles
        .delete_where(|ur| ur.user_id == user_id && ur.role_id == role_id)?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }

    Ok(Json(json!({
        "message": format!("role {role_id} removed from user {user_id}")
    })))
}

/// Every user with the names of the roles they hold, paginated over users.
#[instrument(skip(state))]
pub async fn list_users_with_roles(
    State(state): State<AppState>,
    query: QueryParams,
) -> AppResult<Json<Value>> {
    let mut v = Validator::new();
    let filters = Filters::parse(&query, &USERS_WITH_ROLES, &mut v);
    v.finish()?;

    let (users, metadata) = state.db.users.list(&filters, |_| true)?;
    let users = users
        .iter()
        .map(|user| with_roles(&state.db, user))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({ "users": users, "@metadata": metadata })))
}
