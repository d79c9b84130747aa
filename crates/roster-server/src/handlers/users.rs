//! User handlers

use crate::error::ApiResult;
use crate::extractors::{Json, Path, Query};
use crate::AppState;
use axum::extract::State;
use roster_core::{Page, User, UserCreate, UserDetail, UserId, UserUpdate};

pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.repo.list_users(page).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> ApiResult<Json<UserDetail>> {
    Ok(Json(state.repo.get_user(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<UserCreate>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.repo.create_user(&req).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(req): Json<UserUpdate>,
) -> ApiResult<Json<UserDetail>> {
    Ok(Json(state.repo.update_user(id, &req).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.repo.delete_user(id).await?))
}
