// src/handlers/orders.rs

use axum::{
    extract::{Path, Query, State},
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
        auth::{AuthenticatedUser, MaybeUser},
        rbac::{AdminOnly, RequireRole},
    },
    models::order::{CreateOrderRequest, ListOrdersQuery, Order, OrderDetail, UpdateOrderStatusRequest},
};

// POST /api/orders
#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "Orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Pedido criado", body = OrderDetail),
        (status = 400, description = "Payload inválido", body = ApiError),
        (status = 503, description = "Pedidos desativados", body = ApiError)
    )
)]
pub async fn create_order(
    State(app_state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let ctx = DbContext::for_caller(user.as_ref());
    let mut tx = begin_scoped_tx(&app_state.db_pool, &ctx).await?;

    let detail = app_state
        .order_service
        .create_order(&mut *tx, user.as_ref(), &payload)
        .await?;

    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::CREATED, Json(detail)))
}

// GET /api/orders/mine
#[utoipa::path(
    get,
    path = "/api/orders/mine",
    tag = "Orders",
    responses(
        (status = 200, description = "Pedidos do cliente logado", body = Vec<Order>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_my_orders(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let orders = app_state.order_service.list_my_orders(&mut *tx, &user).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(orders)))
}

// GET /api/orders/{id}
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "Orders",
    responses(
        (status = 200, description = "Pedido com itens", body = OrderDetail),
        (status = 404, description = "Pedido não encontrado", body = ApiError)
    ),
    params(("id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn get_order(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let detail = app_state
        .order_service
        .get_order(&mut *tx, &user, order_id)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(detail)))
}

// GET /api/admin/orders
#[utoipa::path(
    get,
    path = "/api/admin/orders",
    tag = "Orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Pedidos (filtro por status, paginado)", body = Vec<Order>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_orders(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let orders = app_state.order_service.list_orders(&mut *tx, &query).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(orders)))
}

// PATCH /api/admin/orders/{id}/status
#[utoipa::path(
    patch,
    path = "/api/admin/orders/{id}/status",
    tag = "Orders",
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status atualizado (com baixa de estoque/pagamentos)", body = Order),
        (status = 404, description = "Pedido não encontrado", body = ApiError)
    ),
    params(("id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn update_order_status(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let order = app_state
        .order_service
        .update_status(&mut *tx, order_id, payload.status)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(order)))
}

// DELETE /api/admin/orders/{id}
#[utoipa::path(
    delete,
    path = "/api/admin/orders/{id}",
    tag = "Orders",
    responses(
        (status = 204, description = "Pedido apagado"),
        (status = 404, description = "Pedido não encontrado", body = ApiError)
    ),
    params(("id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn delete_order(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    app_state.order_service.delete_order(&mut *tx, order_id).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok(StatusCode::NO_CONTENT)
}
