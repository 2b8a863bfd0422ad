//! Operator user-management handlers over the generic repository.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use idbridge_core::models::mapping::Role;
use idbridge_core::models::user::ExternalUser;
use idbridge_core::password;
use idbridge_core::users::{MAX_PAGE_SIZE, UserQuery};
use serde_json::json;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedTenant;
use crate::models::{
    CreateUserRequest, CreateUserResponse, MutationResponse, SessionsResponse, UpdateUserRequest,
    UserListResponse,
};
use crate::services::tenant::{audit, repository};

/// `GET /api/users?search=&limit=&offset=&sortBy=&sortDir=`
pub async fn list_users(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<UserListResponse>> {
    let repo = repository(&state, &tenant).await?;
    let page = repo.query(&query).await?;
    Ok(Json(UserListResponse {
        users: page.users,
        total: page.total,
        limit: query.limit.clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.max(0),
    }))
}

/// `GET /api/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Path(id): Path<String>,
) -> AppResult<Json<ExternalUser>> {
    let repo = repository(&state, &tenant).await?;
    let user = repo
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;
    Ok(Json(user))
}

/// `POST /api/users`
pub async fn create_user(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<Json<CreateUserResponse>> {
    let repo = repository(&state, &tenant).await?;
    let id = repo.create(&body.fields).await?;
    audit(&state, &tenant, "user.create", json!({ "userId": id })).await;
    Ok(Json(CreateUserResponse { success: true, id }))
}

/// `PATCH /api/users/{id}` — write one field. A value aimed at the password
/// column is hashed first.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<MutationResponse>> {
    let repo = repository(&state, &tenant).await?;
    let column = Role::parse(&body.field)
        .and_then(|role| repo.mapping().column(role))
        .unwrap_or(body.field.as_str())
        .to_string();

    let affected = if repo.mapping().password_column.as_deref() == Some(column.as_str()) {
        let plain = body
            .value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Validation("a password value is required".into()))?;
        repo.update_password(&id, &password::hash_password(plain)?).await?
    } else {
        repo.update_field(&id, &column, body.value).await?
    };
    if affected == 0 {
        return Err(AppError::NotFound(format!("user {id}")));
    }

    audit(
        &state,
        &tenant,
        "user.update",
        json!({ "userId": id, "column": column }),
    )
    .await;
    Ok(Json(MutationResponse {
        success: true,
        affected,
    }))
}

/// `DELETE /api/users/{id}`
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Path(id): Path<String>,
) -> AppResult<Json<MutationResponse>> {
    let repo = repository(&state, &tenant).await?;
    let affected = repo.delete(&id).await?;
    if affected == 0 {
        return Err(AppError::NotFound(format!("user {id}")));
    }
    audit(&state, &tenant, "user.delete", json!({ "userId": id })).await;
    Ok(Json(MutationResponse {
        success: true,
        affected,
    }))
}

/// `GET /api/users/{id}/sessions`
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Path(id): Path<String>,
) -> AppResult<Json<SessionsResponse>> {
    let repo = repository(&state, &tenant).await?;
    let sessions = repo.list_sessions(&id).await?;
    Ok(Json(SessionsResponse { sessions }))
}

/// `DELETE /api/users/{id}/sessions` — force logout.
pub async fn delete_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Path(id): Path<String>,
) -> AppResult<Json<MutationResponse>> {
    let repo = repository(&state, &tenant).await?;
    let affected = repo.delete_sessions(&id).await?;
    audit(
        &state,
        &tenant,
        "user.force_logout",
        json!({ "userId": id, "sessions": affected }),
    )
    .await;
    Ok(Json(MutationResponse {
        success: true,
        affected,
    }))
}
