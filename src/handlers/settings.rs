// src/handlers/settings.rs

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

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
    models::settings::{OrdersEnabledResponse, UpdateOrdersEnabledRequest},
};

// GET /api/admin/settings/orders-enabled
// Público: o checkout consulta antes de mostrar o formulário.
#[utoipa::path(
    get,
    path = "/api/admin/settings/orders-enabled",
    tag = "Settings",
    responses(
        (status = 200, description = "Se a loja aceita pedidos e de onde veio a decisão", body = OrdersEnabledResponse)
    )
)]
pub async fn get_orders_enabled(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::Anonymous).await?;
    let settings = app_state.settings_service.orders_enabled(&mut *tx).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(settings)))
}

// PUT /api/admin/settings/orders-enabled
#[utoipa::path(
    put,
    path = "/api/admin/settings/orders-enabled",
    tag = "Settings",
    request_body = UpdateOrdersEnabledRequest,
    responses(
        (status = 200, description = "Configuração gravada", body = OrdersEnabledResponse),
        (status = 403, description = "Somente administradores", body = ApiError)
    ),
    security(("api_jwt" = []))
)]
pub async fn update_orders_enabled(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateOrdersEnabledRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user)).await?;
    let updated = app_state
        .settings_service
        .set_orders_enabled(&mut *tx, &payload)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(updated)))
}
