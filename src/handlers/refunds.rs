// src/handlers/refunds.rs

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
        rbac::{AdminOnly, RequireRole},
    },
    models::{
        order::{Order, OrderItem},
        refund::{RequestRefundRequest, RespondRefundRequest},
    },
};

// ---
// ITEM
// ---

// POST /api/refunds/items/{item_id}
#[utoipa::path(
    post,
    path = "/api/refunds/items/{item_id}",
    tag = "Refunds",
    request_body = RequestRefundRequest,
    responses(
        (status = 200, description = "Item com o novo status de reembolso e o `mode`", body = OrderItem),
        (status = 409, description = "Prazo expirado ou estado inválido", body = ApiError)
    ),
    params(("item_id" = Uuid, Path, description = "ID do item do pedido")),
    security(("api_jwt" = []))
)]
pub async fn request_item_refund(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<RequestRefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let outcome = app_state
        .refund_service
        .request_item_refund(&mut *tx, &user, item_id, &payload.reason, payload.admin_initiated)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(outcome)))
}

// POST /api/refunds/items/{item_id}/cancel
#[utoipa::path(
    post,
    path = "/api/refunds/items/{item_id}/cancel",
    tag = "Refunds",
    responses(
        (status = 200, description = "Pedido de reembolso do item cancelado", body = OrderItem),
        (status = 409, description = "Nenhum reembolso em aberto", body = ApiError)
    ),
    params(("item_id" = Uuid, Path, description = "ID do item do pedido")),
    security(("api_jwt" = []))
)]
pub async fn cancel_item_refund(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let outcome = app_state
        .refund_service
        .cancel_item_refund(&mut *tx, &user, item_id)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(outcome)))
}

// POST /api/admin/refunds/items/{item_id}/respond
#[utoipa::path(
    post,
    path = "/api/admin/refunds/items/{item_id}/respond",
    tag = "Refunds",
    request_body = RespondRefundRequest,
    responses(
        (status = 200, description = "Decisão registrada (aprovação devolve ao estoque)", body = OrderItem),
        (status = 409, description = "Nenhum reembolso em aberto", body = ApiError)
    ),
    params(("item_id" = Uuid, Path, description = "ID do item do pedido")),
    security(("api_jwt" = []))
)]
pub async fn respond_item_refund(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<RespondRefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let outcome = app_state
        .refund_service
        .respond_item_refund(&mut *tx, item_id, payload.decision)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(outcome)))
}

// ---
// PEDIDO INTEIRO
// ---

// POST /api/refunds/orders/{order_id}
#[utoipa::path(
    post,
    path = "/api/refunds/orders/{order_id}",
    tag = "Refunds",
    request_body = RequestRefundRequest,
    responses(
        (status = 200, description = "Pedido com o novo status de reembolso e o `mode`", body = Order),
        (status = 409, description = "Prazo expirado ou estado inválido", body = ApiError)
    ),
    params(("order_id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn request_order_refund(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RequestRefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let outcome = app_state
        .refund_service
        .request_order_refund(&mut *tx, &user, order_id, &payload.reason, payload.admin_initiated)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(outcome)))
}

// POST /api/refunds/orders/{order_id}/cancel
#[utoipa::path(
    post,
    path = "/api/refunds/orders/{order_id}/cancel",
    tag = "Refunds",
    responses(
        (status = 200, description = "Pedido de reembolso cancelado", body = Order),
        (status = 409, description = "Nenhum reembolso em aberto", body = ApiError)
    ),
    params(("order_id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn cancel_order_refund(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let outcome = app_state
        .refund_service
        .cancel_order_refund(&mut *tx, &user, order_id)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(outcome)))
}

// POST /api/admin/refunds/orders/{order_id}/respond
#[utoipa::path(
    post,
    path = "/api/admin/refunds/orders/{order_id}/respond",
    tag = "Refunds",
    request_body = RespondRefundRequest,
    responses(
        (status = 200, description = "Decisão registrada no pedido inteiro", body = Order),
        (status = 409, description = "Nenhum reembolso em aberto", body = ApiError)
    ),
    params(("order_id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn respond_order_refund(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RespondRefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let outcome = app_state
        .refund_service
        .respond_order_refund(&mut *tx, order_id, payload.decision)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(outcome)))
}
