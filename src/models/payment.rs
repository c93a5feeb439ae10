// src/models/payment.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::money::validate_charge;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Kpay,
}

impl PaymentMethod {
    pub fn is_cod(&self) -> bool {
        matches!(self, PaymentMethod::CashOnDelivery)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    // A KPay às vezes responde "successful"
    #[serde(alias = "successful", alias = "success")]
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// Motivo gravado quando o pedido COD é cancelado.
pub const ORDER_CANCELLED_REASON: &str = "order_cancelled";

/// Referência sintética dos pagamentos na entrega.
pub fn cod_reference(order_number: &str) -> String {
    format!("COD-{}", order_number)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    #[schema(example = "KP-6F1C2B7E9A")]
    pub reference: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub currency: String,
    pub phone: Option<String>,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Um pedido só é considerado pago se algum pagamento registrado estiver concluído.
/// Nunca confiar num "success" vindo da URL ou do payload de polling.
pub fn payments_authorize(payments: &[Payment]) -> bool {
    payments.iter().any(|p| p.status == PaymentStatus::Completed)
}

// --- Contratos HTTP da KPay (versão 1, sem adivinhação de formato) ---

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PaymentReferenceRequest {
    #[validate(length(min = 1, message = "A referência é obrigatória."))]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub order_id: Option<Uuid>,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub success: bool,
    pub order_id: Option<Uuid>,
    #[serde(default)]
    pub can_create_order: bool,
    pub message: Option<String>,
}

impl FinalizeResponse {
    /// Decide o resultado do "finalize" a partir do pagamento registrado.
    pub fn for_payment(payment: &Payment) -> Self {
        match (payment.status, payment.order_id) {
            (PaymentStatus::Completed, Some(order_id)) => FinalizeResponse {
                success: true,
                order_id: Some(order_id),
                can_create_order: false,
                message: None,
            },
            (PaymentStatus::Completed, None) => FinalizeResponse {
                success: true,
                order_id: None,
                can_create_order: true,
                message: None,
            },
            (PaymentStatus::Pending, _) => FinalizeResponse {
                success: false,
                order_id: None,
                can_create_order: false,
                message: Some("Pagamento ainda pendente.".to_string()),
            },
            (_, _) => FinalizeResponse {
                success: false,
                order_id: None,
                can_create_order: false,
                message: payment
                    .failure_reason
                    .clone()
                    .or_else(|| Some("Pagamento não concluído.".to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkPaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "A referência é obrigatória."))]
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    #[validate(length(min = 6, message = "O telefone é obrigatório."))]
    pub phone: String,
    #[validate(custom(function = "validate_charge"))]
    pub amount: Decimal,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub reference: String,
    pub status: PaymentStatus,
}

/// Callback assíncrono da KPay.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KpayWebhookPayload {
    pub reference: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(status: PaymentStatus, order_id: Option<Uuid>) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            order_id,
            reference: "KP-1".into(),
            method: PaymentMethod::Kpay,
            amount: Decimal::from(100),
            currency: "CDF".into(),
            phone: None,
            status,
            failure_reason: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cod_reference_uses_order_number() {
        assert_eq!(cod_reference("ORD-1"), "COD-ORD-1");
    }

    #[test]
    fn successful_is_an_alias_for_completed() {
        let status: PaymentStatus = serde_json::from_str("\"successful\"").unwrap();
        assert_eq!(status, PaymentStatus::Completed);
        let status: PaymentStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, PaymentStatus::Completed);
    }

    #[test]
    fn only_completed_payments_authorize() {
        assert!(!payments_authorize(&[]));
        assert!(!payments_authorize(&[payment(PaymentStatus::Pending, None)]));
        assert!(payments_authorize(&[
            payment(PaymentStatus::Failed, None),
            payment(PaymentStatus::Completed, None),
        ]));
    }

    #[test]
    fn finalize_decisions() {
        let order_id = Uuid::new_v4();
        let linked = FinalizeResponse::for_payment(&payment(PaymentStatus::Completed, Some(order_id)));
        assert!(linked.success);
        assert_eq!(linked.order_id, Some(order_id));
        assert!(!linked.can_create_order);

        let orphan = FinalizeResponse::for_payment(&payment(PaymentStatus::Completed, None));
        assert!(orphan.success && orphan.can_create_order);

        let pending = FinalizeResponse::for_payment(&payment(PaymentStatus::Pending, None));
        assert!(!pending.success && !pending.can_create_order);

        let mut failed = payment(PaymentStatus::Failed, None);
        failed.failure_reason = Some("insufficient_funds".into());
        let failed = FinalizeResponse::for_payment(&failed);
        assert_eq!(failed.message.as_deref(), Some("insufficient_funds"));
    }

    #[test]
    fn charge_amount_must_be_positive() {
        let request = |amount: Decimal| InitiatePaymentRequest {
            phone: "0990000000".into(),
            amount,
            currency: None,
        };
        assert!(request(Decimal::from(1500)).validate().is_ok());
        assert!(request(Decimal::ZERO).validate().is_err());
        assert!(request(Decimal::from(-10)).validate().is_err());
    }
}
