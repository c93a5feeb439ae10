// src/handlers/payments.rs

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
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
    middleware::auth::{AuthenticatedUser, MaybeUser},
    models::payment::{
        FinalizeResponse, InitiatePaymentRequest, InitiatePaymentResponse, LinkPaymentRequest,
        Payment, PaymentReferenceRequest, PaymentStatusResponse,
    },
    services::kpay::SIGNATURE_HEADER,
};

// ---
// KPay (checkout, aceita convidados)
// ---

// POST /api/payments/kpay/initiate
#[utoipa::path(
    post,
    path = "/api/payments/kpay/initiate",
    tag = "Payments",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 201, description = "Cobrança iniciada", body = InitiatePaymentResponse),
        (status = 503, description = "KPay não configurada", body = ApiError)
    )
)]
pub async fn initiate_payment(
    State(app_state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::for_caller(user.as_ref())).await?;
    let response = app_state.payment_service.initiate(&mut *tx, &payload).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::CREATED, Json(response)))
}

// POST /api/payments/kpay/status
#[utoipa::path(
    post,
    path = "/api/payments/kpay/status",
    tag = "Payments",
    request_body = PaymentReferenceRequest,
    responses(
        (status = 200, description = "Status registrado do pagamento", body = PaymentStatusResponse),
        (status = 404, description = "Referência desconhecida", body = ApiError)
    )
)]
pub async fn payment_status(
    State(app_state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(payload): Json<PaymentReferenceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::for_caller(user.as_ref())).await?;
    let status = app_state.payment_service.status(&mut *tx, &payload.reference).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(status)))
}

// POST /api/payments/kpay/finalize
#[utoipa::path(
    post,
    path = "/api/payments/kpay/finalize",
    tag = "Payments",
    request_body = PaymentReferenceRequest,
    responses(
        (status = 200, description = "Resultado da finalização", body = FinalizeResponse),
        (status = 404, description = "Referência desconhecida", body = ApiError)
    )
)]
pub async fn finalize_payment(
    State(app_state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(payload): Json<PaymentReferenceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::for_caller(user.as_ref())).await?;
    let result = app_state.payment_service.finalize(&mut *tx, &payload.reference).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(result)))
}

// POST /api/payments/kpay/webhook
// O corpo cru é necessário para conferir a assinatura.
#[utoipa::path(
    post,
    path = "/api/payments/kpay/webhook",
    tag = "Payments",
    request_body(content = crate::models::payment::KpayWebhookPayload, description = "Callback assinado (HMAC-SHA256 em hex no header X-KPay-Signature)"),
    responses(
        (status = 200, description = "Evento aplicado (ou já aplicado)", body = Payment),
        (status = 401, description = "Assinatura inválida", body = ApiError)
    )
)]
pub async fn kpay_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::Privileged).await?;
    let payment = app_state
        .payment_service
        .handle_webhook(&mut *tx, &body, signature)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(payment)))
}

// ---
// Pagamentos de um pedido (autenticado)
// ---

// GET /api/payments/order/{order_id}
#[utoipa::path(
    get,
    path = "/api/payments/order/{order_id}",
    tag = "Payments",
    responses(
        (status = 200, description = "Pagamentos registrados do pedido", body = Vec<Payment>),
        (status = 404, description = "Pedido não encontrado", body = ApiError)
    ),
    params(("order_id" = Uuid, Path, description = "ID do pedido")),
    security(("api_jwt" = []))
)]
pub async fn list_order_payments(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let payments = app_state
        .payment_service
        .list_for_order(&mut *tx, &user, order_id)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(payments)))
}

// POST /api/payments/link
#[utoipa::path(
    post,
    path = "/api/payments/link",
    tag = "Payments",
    request_body = LinkPaymentRequest,
    responses(
        (status = 200, description = "Pagamento vinculado ao pedido", body = Payment),
        (status = 409, description = "Pagamento já vinculado a outro pedido", body = ApiError)
    ),
    security(("api_jwt" = []))
)]
pub async fn link_payment(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<LinkPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut tx = begin_scoped_tx(&app_state.db_pool, &DbContext::User(user.clone())).await?;
    let payment = app_state.payment_service.link(&mut *tx, &user, &payload).await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok((StatusCode::OK, Json(payment)))
}
