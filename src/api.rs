use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;

use crate::auth::{self, AuthUser, Tenant};
use crate::db::DbHandle;
use crate::errors::StoreError;
use crate::models::*;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(serde::Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Deserialize)]
pub struct CreateInventoryRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub username: String,
}

#[derive(Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: Role,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct AddProjectItemRequest {
    pub item_id: i64,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ProjectStatus,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub return_items: bool,
}

// ── Error handling ────────────────────────────────────────────────────

/// API failure surfaced to the caller as
/// `{"error": {"code": "...", "detail": "..."}}`.
pub enum ApiError {
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    InsufficientStock(String),
    StateConflict(String),
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::Validation(d) => (StatusCode::BAD_REQUEST, "validation", d),
            ApiError::Unauthorized(d) => (StatusCode::UNAUTHORIZED, "unauthorized", d),
            ApiError::Forbidden(d) => (StatusCode::FORBIDDEN, "forbidden", d),
            ApiError::NotFound(d) => (StatusCode::NOT_FOUND, "not_found", d),
            ApiError::InsufficientStock(d) => (StatusCode::CONFLICT, "insufficient_stock", d),
            ApiError::StateConflict(d) => (StatusCode::CONFLICT, "state_conflict", d),
            ApiError::Internal(d) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", d),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let detail = err.to_string();
        match err {
            StoreError::ItemNotFound { .. }
            | StoreError::ProjectNotFound { .. }
            | StoreError::InventoryNotFound { .. }
            | StoreError::UserNotFound(_) => ApiError::NotFound(detail),
            StoreError::UsernameTaken(_) | StoreError::Validation(_) => {
                ApiError::Validation(detail)
            }
            StoreError::InvalidCredentials => ApiError::Unauthorized(detail),
            StoreError::InsufficientStock { .. } => ApiError::InsufficientStock(detail),
            StoreError::InvalidTransition { .. }
            | StoreError::ProjectNotPlanning { .. }
            | StoreError::ProjectNotDeletable { .. } => ApiError::StateConflict(detail),
            StoreError::LockPoisoned | StoreError::Database(_) => {
                tracing::error!("store error: {}", detail);
                ApiError::Internal(detail)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.parts();
        (
            status,
            Json(serde_json::json!({"error": {"code": code, "detail": detail}})),
        )
            .into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/users/me", get(me))
        .route("/inventories", get(list_inventories).post(create_inventory))
        .route(
            "/inventories/{id}/members",
            get(list_members).post(add_member),
        )
        .route(
            "/inventories/{id}/members/{user_id}",
            put(update_member_role).delete(remove_member),
        )
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/items/{id}/add/{amount}", post(add_stock))
        .route("/items/{id}/remove/{amount}", post(remove_stock))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}", get(get_project).delete(delete_project))
        .route("/projects/{id}/items", post(add_project_item))
        .route("/projects/{id}/status", put(update_project_status))
        .route("/dashboard/stats", get(dashboard_stats))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/users", get(admin_list_users))
        .route("/admin/inventories", get(admin_list_inventories))
        .route("/admin/users/{id}/promote", post(admin_promote_user))
        .route("/admin/users/{id}", delete(admin_delete_user))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn require_super_admin(user: &User) -> Result<(), ApiError> {
    if user.is_super_admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "This operation requires super-admin rights".into(),
        ))
    }
}

/// Role of `user_id` in `inventory_id`, or Forbidden. Non-members get the
/// same rejection whether or not the inventory exists.
async fn member_role(
    state: &SharedState,
    inventory_id: i64,
    user_id: i64,
) -> Result<Role, ApiError> {
    state
        .db
        .call(move |db| db.membership_role(inventory_id, user_id))
        .await?
        .ok_or_else(|| ApiError::Forbidden("Not a member of this inventory".into()))
}

// ── Handlers: auth ────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::Validation("username must not be empty".into()));
    }
    if req.password.len() < 6 {
        return Err(ApiError::Validation(
            "password must be at least 6 characters".into(),
        ));
    }
    let salt = auth::new_salt();
    let hash = auth::hash_password(&req.password, &salt);
    let user = state
        .db
        .call(move |db| db.create_user(&username, &hash, &salt, false))
        .await?;
    tracing::info!(user = %user.username, "registered user");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    let creds = state
        .db
        .call(move |db| db.credentials_for(&username))
        .await?;
    // Same rejection for unknown user and wrong password.
    let (user_id, hash, salt) = creds.ok_or(StoreError::InvalidCredentials)?;
    if !auth::verify_password(&req.password, &salt, &hash) {
        return Err(StoreError::InvalidCredentials.into());
    }
    let token = auth::new_token();
    let token_clone = token.clone();
    state
        .db
        .call(move |db| db.create_session(&token_clone, user_id))
        .await?;
    Ok(Json(TokenResponse { token }))
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

// ── Handlers: inventories & members ───────────────────────────────────

async fn list_inventories(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let inventories = state
        .db
        .call(move |db| db.inventories_for_user(user.id))
        .await?;
    Ok(Json(inventories))
}

async fn create_inventory(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateInventoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation(
            "inventory name must not be empty".into(),
        ));
    }
    let inventory = state
        .db
        .call(move |db| db.create_inventory(&name, user.id))
        .await?;
    Ok((StatusCode::CREATED, Json(inventory)))
}

async fn list_members(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(inventory_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    member_role(&state, inventory_id, user.id).await?;
    let members = state
        .db
        .call(move |db| db.list_members(inventory_id))
        .await?;
    Ok(Json(members))
}

async fn add_member(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(inventory_id): Path<i64>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = member_role(&state, inventory_id, user.id).await?;
    if role != Role::Admin {
        return Err(ApiError::Forbidden(
            "Only inventory admins can add members".into(),
        ));
    }
    let member = state
        .db
        .call(move |db| db.add_member(inventory_id, &req.username))
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn update_member_role(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path((inventory_id, member_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = member_role(&state, inventory_id, user.id).await?;
    if role != Role::Admin {
        return Err(ApiError::Forbidden(
            "Only inventory admins can change roles".into(),
        ));
    }
    let member = state
        .db
        .call(move |db| db.update_member_role(inventory_id, member_id, req.role))
        .await?;
    Ok(Json(member))
}

async fn remove_member(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path((inventory_id, member_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let role = member_role(&state, inventory_id, user.id).await?;
    if role != Role::Admin {
        return Err(ApiError::Forbidden(
            "Only inventory admins can remove members".into(),
        ));
    }
    let removed = state
        .db
        .call(move |db| db.remove_member(inventory_id, member_id))
        .await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Member not found".into()))
    }
}

// ── Handlers: items ───────────────────────────────────────────────────

async fn list_items(
    State(state): State<SharedState>,
    tenant: Tenant,
) -> Result<impl IntoResponse, ApiError> {
    let inv = tenant.inventory_id;
    let items = state.db.call(move |db| db.list_items(inv)).await?;
    Ok(Json(items))
}

async fn create_item(
    State(state): State<SharedState>,
    tenant: Tenant,
    Json(req): Json<ItemCreate>,
) -> Result<impl IntoResponse, ApiError> {
    tenant.require_admin()?;
    let (inv, actor) = (tenant.inventory_id, tenant.user.id);
    let item = state
        .db
        .call(move |db| db.create_item(inv, actor, &req))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let inv = tenant.inventory_id;
    let item = state
        .db
        .call(move |db| db.get_item(inv, id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Item {} not found", id)))?;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path(id): Path<i64>,
    Json(req): Json<ItemUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let (inv, actor) = (tenant.inventory_id, tenant.user.id);
    let item = state
        .db
        .call(move |db| db.update_item(inv, id, actor, &req))
        .await?;
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    tenant.require_admin()?;
    let (inv, actor) = (tenant.inventory_id, tenant.user.id);
    let deleted = state
        .db
        .call(move |db| db.delete_item(inv, id, actor))
        .await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Item {} not found", id)))
    }
}

async fn add_stock(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path((id, amount)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    adjust_stock(state, tenant, id, amount, 1).await
}

async fn remove_stock(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path((id, amount)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    adjust_stock(state, tenant, id, amount, -1).await
}

/// Shared by the add/remove endpoints (the scan-in/scan-out flow).
/// The path amount must be strictly positive; `sign` encodes the
/// direction.
async fn adjust_stock(
    state: SharedState,
    tenant: Tenant,
    id: i64,
    amount: i64,
    sign: i64,
) -> Result<Json<Item>, ApiError> {
    if amount <= 0 {
        return Err(ApiError::Validation("amount must be positive".into()));
    }
    let delta = amount * sign;
    let (inv, actor) = (tenant.inventory_id, tenant.user.id);
    let item = state
        .db
        .call(move |db| db.adjust_stock(inv, id, delta, actor))
        .await?;
    tracing::debug!(item = item.id, delta, stock = item.stock, "stock adjusted");
    Ok(Json(item))
}

// ── Handlers: projects ────────────────────────────────────────────────

async fn list_projects(
    State(state): State<SharedState>,
    tenant: Tenant,
) -> Result<impl IntoResponse, ApiError> {
    let inv = tenant.inventory_id;
    let projects = state.db.call(move |db| db.list_projects(inv)).await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    tenant: Tenant,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (inv, owner) = (tenant.inventory_id, tenant.user.id);
    let project = state
        .db
        .call(move |db| db.create_project(inv, owner, &req.title, req.description.as_deref()))
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let inv = tenant.inventory_id;
    let project = state
        .db
        .call(move |db| db.get_project(inv, id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", id)))?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let inv = tenant.inventory_id;
    let deleted = state.db.call(move |db| db.delete_project(inv, id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Project {} not found", id)))
    }
}

async fn add_project_item(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path(id): Path<i64>,
    Json(req): Json<AddProjectItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let inv = tenant.inventory_id;
    let project = state
        .db
        .call(move |db| db.add_project_item(inv, id, req.item_id, req.quantity))
        .await?;
    Ok(Json(project))
}

async fn update_project_status(
    State(state): State<SharedState>,
    tenant: Tenant,
    Path(id): Path<i64>,
    Query(query): Query<StatusQuery>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (inv, actor) = (tenant.inventory_id, tenant.user.id);
    let project = state
        .db
        .call(move |db| db.transition_project(inv, id, actor, req.status, query.return_items))
        .await?;
    tracing::info!(
        project = project.id,
        status = %project.status,
        return_items = query.return_items,
        "project transitioned"
    );
    Ok(Json(project))
}

// ── Handlers: dashboard & admin ───────────────────────────────────────

async fn dashboard_stats(
    State(state): State<SharedState>,
    tenant: Tenant,
) -> Result<impl IntoResponse, ApiError> {
    let inv = tenant.inventory_id;
    let stats = state.db.call(move |db| db.dashboard_stats(inv)).await?;
    Ok(Json(stats))
}

async fn admin_stats(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    require_super_admin(&user)?;
    let stats = state.db.call(|db| db.global_stats()).await?;
    Ok(Json(stats))
}

async fn admin_list_users(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    require_super_admin(&user)?;
    let users = state.db.call(|db| db.list_users()).await?;
    Ok(Json(users))
}

async fn admin_list_inventories(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    require_super_admin(&user)?;
    let inventories = state.db.call(|db| db.list_all_inventories()).await?;
    Ok(Json(inventories))
}

async fn admin_promote_user(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_super_admin(&user)?;
    let promoted = state.db.call(move |db| db.promote_user(id)).await?;
    Ok(Json(promoted))
}

async fn admin_delete_user(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_super_admin(&user)?;
    if user.id == id {
        return Err(ApiError::Validation(
            "Cannot delete your own account".into(),
        ));
    }
    let deleted = state.db.call(move |db| db.delete_user(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("User {} not found", id)))
    }
}
