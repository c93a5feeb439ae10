// src/handlers/riders.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        db_utils::{begin_scoped_tx, DbContext},
        error::{ApiError, AppError},
    },
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{AdminOnly, RequireRole, RiderOnly},
    },
    models::rider::{
        AssignRiderRequest, CreateRiderRequest, OrderAssignment, OrderAssignmentResponse,
        RespondAssignmentRequest, Rider, SetRiderActiveRequest,
    },
};

// ---
// CADASTRO (admin)
// ---

// GET /api/admin/riders
#[utoipa::path(
    get,
    path = "/api/admin/riders",
    tag = "Riders",
    responses((status = 200, description = "Entregadores cadastrados", body = Vec<Rider>)),
    security(("api_jwt" = []))
)]
pub async fn list_riders(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let riders = app_state.rider_service.list_riders(&mut *tx).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(riders)))
}

// POST /api/admin/riders
#[utoipa::path(
    post,
    path = "/api/admin/riders",
    tag = "Riders",
    request_body = CreateRiderRequest,
    responses((status = 201, description = "Entregador cadastrado", body = Rider)),
    security(("api_jwt" = []))
)]
pub async fn create_rider(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateRiderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let rider = app_state.rider_service.create_rider(&mut *tx, &payload).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::CREATED, Json(rider)))
}

// PUT /api/admin/riders/{id}/active
#[utoipa::path(
    put,
    path = "/api/admin/riders/{id}/active",
    tag = "Riders",
    request_body = SetRiderActiveRequest,
    responses(
        (status = 200, description = "Entregador ativado/desativado", body = Rider),
        (status = 404, description = "Entregador não encontrado", body = ApiError)
    ),
    params(("id" = Uuid, Path, description = "ID do entregador")),
    security(("api_jwt" = []))
)]
pub async fn set_rider_active(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Path(rider_id): Path<Uuid>,
    Json(payload): Json<SetRiderActiveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let rider = app_state
        .rider_service
        .set_active(&mut *tx, rider_id, payload.active)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(rider)))
}

// ---
// ATRIBUIÇÃO (admin)
// ---

// POST /api/admin/orders/{id}/assign
#[utoipa::path(
    post,
    path = "/api/admin/orders/{id}/assign",
    tag = "Riders",
    request_body = AssignRiderRequest,
    responses(
        (status = 201, description = "Entregador atribuído; pedido em `assigned`", body = OrderAssignment),
        (status = 409, description = "Pedido não pendente ou entregador inativo", body = ApiError)
    ),
    params(("id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn assign_rider(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AssignRiderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let assignment = app_state
        .rider_service
        .assign(&mut *tx, order_id, &payload)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

// POST /api/admin/orders/{id}/reassign
#[utoipa::path(
    post,
    path = "/api/admin/orders/{id}/reassign",
    tag = "Riders",
    request_body = AssignRiderRequest,
    responses(
        (status = 201, description = "Atribuição anterior substituída", body = OrderAssignment),
        (status = 409, description = "Entregador inativo", body = ApiError)
    ),
    params(("id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn reassign_rider(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AssignRiderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let assignment = app_state
        .rider_service
        .reassign(&mut *tx, order_id, &payload)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

// GET /api/orders/{id}/assignment
#[utoipa::path(
    get,
    path = "/api/orders/{id}/assignment",
    tag = "Riders",
    responses(
        (status = 200, description = "Entregador da atribuição ativa (ou null)", body = OrderAssignmentResponse),
        (status = 404, description = "Pedido não encontrado", body = ApiError)
    ),
    params(("id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn get_order_assignment(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let response = app_state
        .rider_service
        .order_assignment(&mut *tx, &user, order_id)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(response)))
}

// ---
// ENTREGADOR
// ---

// GET /api/riders/me/assignments
#[utoipa::path(
    get,
    path = "/api/riders/me/assignments",
    tag = "Riders",
    responses(
        (status = 200, description = "Atribuições do entregador logado", body = Vec<OrderAssignment>),
        (status = 404, description = "Usuário sem cadastro de entregador", body = ApiError)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_my_assignments(
    State(app_state): State<AppState>,
    _guard: RequireRole<RiderOnly>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let assignments = app_state.rider_service.my_assignments(&mut *tx, &user).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(assignments)))
}

// POST /api/riders/assignments/{id}/respond
#[utoipa::path(
    post,
    path = "/api/riders/assignments/{id}/respond",
    tag = "Riders",
    request_body = RespondAssignmentRequest,
    responses(
        (status = 200, description = "Resposta registrada; status do pedido acompanha", body = OrderAssignment),
        (status = 403, description = "Atribuição de outro entregador", body = ApiError),
        (status = 404, description = "Atribuição inexistente ou encerrada", body = ApiError)
    ),
    params(("id" = Uuid, Path, description = "ID da atribuição")),
    security(("api_jwt" = []))
)]
pub async fn respond_assignment(
    State(app_state): State<AppState>,
    _guard: RequireRole<RiderOnly>,
    user: AuthenticatedUser,
    Path(assignment_id): Path<Uuid>,
    Json(payload): Json<RespondAssignmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let assignment = app_state
        .rider_service
        .respond(&mut *tx, &user, assignment_id, &payload)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(assignment)))
}
