//! Group and membership handlers

use crate::error::ApiResult;
use crate::extractors::{Json, Path, Query};
use crate::AppState;
use axum::extract::State;
use roster_core::{GroupCreate, GroupDetail, GroupId, GroupUpdate, Page, UserId};

pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<GroupDetail>>> {
    Ok(Json(state.repo.list_groups(page).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
) -> ApiResult<Json<GroupDetail>> {
    Ok(Json(state.repo.get_group(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<GroupCreate>,
) -> ApiResult<Json<GroupDetail>> {
    Ok(Json(state.repo.create_group(&req).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    Json(req): Json<GroupUpdate>,
) -> ApiResult<Json<GroupDetail>> {
    Ok(Json(state.repo.update_group_members(id, &req).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
) -> ApiResult<Json<GroupDetail>> {
    Ok(Json(state.repo.delete_group(id).await?))
}

pub async fn add_user(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> ApiResult<Json<GroupDetail>> {
    Ok(Json(state.repo.add_membership(group_id, user_id).await?))
}

pub async fn remove_user(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> ApiResult<Json<GroupDetail>> {
    Ok(Json(state.repo.remove_membership(group_id, user_id).await?))
}
