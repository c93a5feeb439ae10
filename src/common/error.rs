// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::order::{OrderStatus, RefundStatus};

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// Cada variante de domínio tem um `code()` estável para o frontend.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("O prazo de 24 horas para reembolso expirou")]
    RefundExpired,

    #[error("Ação de reembolso inválida no estado atual ({current})")]
    InvalidRefundState { current: RefundStatus },

    #[error("Pedido não encontrado")]
    OrderNotFound,

    #[error("Item do pedido não encontrado")]
    OrderItemNotFound,

    #[error("Entregador não encontrado")]
    RiderNotFound,

    #[error("Entregador inativo")]
    RiderInactive,

    #[error("O pedido precisa estar pendente para ser atribuído")]
    OrderNotPending,

    #[error("Pedido encerrado ({current:?}) não muda mais de status")]
    OrderClosed { current: OrderStatus },

    #[error("Atribuição não encontrada")]
    AssignmentNotFound,

    #[error("Pagamento não encontrado")]
    PaymentNotFound,

    #[error("Pedidos desativados: {0}")]
    OrdersDisabled(String),

    #[error("O pagamento já está vinculado a outro pedido")]
    PaymentAlreadyLinked,

    #[error("Pagamento KPay não configurado")]
    PaymentProviderUnavailable,

    #[error("Assinatura do webhook inválida")]
    InvalidSignature,

    #[error("Payload inválido: {0}")]
    InvalidPayload(String),

    #[error("Acesso negado")]
    Forbidden,

    #[error("Token inválido")]
    InvalidToken,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro ao chamar serviço externo: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::RefundExpired => "REFUND_EXPIRED",
            AppError::InvalidRefundState { .. } => "INVALID_REFUND_STATE",
            AppError::OrderNotFound => "ORDER_NOT_FOUND",
            AppError::OrderItemNotFound => "ORDER_ITEM_NOT_FOUND",
            AppError::RiderNotFound => "RIDER_NOT_FOUND",
            AppError::RiderInactive => "RIDER_INACTIVE",
            AppError::OrderNotPending => "ORDER_NOT_PENDING",
            AppError::OrderClosed { .. } => "ORDER_CLOSED",
            AppError::AssignmentNotFound => "ASSIGNMENT_NOT_FOUND",
            AppError::PaymentNotFound => "PAYMENT_NOT_FOUND",
            AppError::OrdersDisabled(_) => "ORDERS_DISABLED",
            AppError::PaymentAlreadyLinked => "PAYMENT_ALREADY_LINKED",
            AppError::PaymentProviderUnavailable => "PAYMENT_PROVIDER_UNAVAILABLE",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::InvalidPayload(_) => "INVALID_PAYLOAD",
            AppError::Forbidden => "FORBIDDEN",
            AppError::InvalidToken | AppError::JwtError(_) => "INVALID_TOKEN",
            AppError::DatabaseError(_)
            | AppError::HttpClientError(_)
            | AppError::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            AppError::RefundExpired
            | AppError::InvalidRefundState { .. }
            | AppError::OrderNotPending
            | AppError::OrderClosed { .. }
            | AppError::RiderInactive
            | AppError::PaymentAlreadyLinked => StatusCode::CONFLICT,
            AppError::OrderNotFound
            | AppError::OrderItemNotFound
            | AppError::RiderNotFound
            | AppError::AssignmentNotFound
            | AppError::PaymentNotFound => StatusCode::NOT_FOUND,
            AppError::OrdersDisabled(_) | AppError::PaymentProviderUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::InvalidSignature | AppError::InvalidToken | AppError::JwtError(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DatabaseError(_)
            | AppError::HttpClientError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        let status = self.status();

        if let AppError::ValidationError(errors) = self {
            let mut details = std::collections::HashMap::new();
            for (field, field_errors) in errors.field_errors() {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                details.insert(field.to_string(), messages);
            }
            return ApiError {
                status,
                code: self.code(),
                error: "Um ou mais campos são inválidos.".to_string(),
                details: Some(json!(details)),
            };
        }

        // Erros internos não vazam detalhes para o cliente, só para o log.
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Erro Interno do Servidor: {:?}", self);
            "Ocorreu um erro inesperado.".to_string()
        } else {
            self.to_string()
        };

        ApiError {
            status,
            code: self.code(),
            error,
            details: None,
        }
    }
}

/// Corpo de erro devolvido pela API.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        err.to_api_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_codes_and_statuses() {
        assert_eq!(AppError::RefundExpired.code(), "REFUND_EXPIRED");
        assert_eq!(AppError::RefundExpired.status(), StatusCode::CONFLICT);

        let err = AppError::InvalidRefundState { current: RefundStatus::Approved };
        assert_eq!(err.code(), "INVALID_REFUND_STATE");
        assert!(err.to_string().contains("approved"));

        assert_eq!(AppError::OrderNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::OrderNotPending.code(), "ORDER_NOT_PENDING");
        let closed = AppError::OrderClosed { current: OrderStatus::Refunded };
        assert_eq!(closed.code(), "ORDER_CLOSED");
        assert_eq!(closed.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::RiderInactive.code(), "RIDER_INACTIVE");
        assert_eq!(AppError::AssignmentNotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::InternalServerError(anyhow::anyhow!("senha do banco: hunter2"));
        let api = err.to_api_error();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code, "INTERNAL_ERROR");
        assert!(!api.error.contains("hunter2"));
    }

    #[test]
    fn validation_errors_carry_field_details() {
        let mut errors = validator::ValidationErrors::new();
        let mut e = validator::ValidationError::new("length");
        e.message = Some("O motivo é obrigatório.".into());
        errors.add("reason", e);

        let api = AppError::ValidationError(errors).to_api_error();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        let details = api.details.expect("details");
        assert_eq!(details["reason"][0], "O motivo é obrigatório.");
    }
}
