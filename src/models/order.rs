// src/models/order.rs

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::{error::AppError, money::validate_amount};
use crate::models::payment::PaymentMethod;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Assigned,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// `cancelled` e `refunded` encerram o pedido.
    pub fn is_closed(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Mudança manual de status: pedido encerrado só aceita o mesmo status.
    pub fn ensure_can_move_to(self, next: OrderStatus) -> Result<(), AppError> {
        if self.is_closed() && next != self {
            return Err(AppError::OrderClosed { current: self });
        }
        Ok(())
    }
}

/// Vocabulário de reembolso, compartilhado por pedidos e itens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "refund_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    None,
    Requested,
    Approved,
    Rejected,
    /// Recusado pelo administrador: o item continua vendido.
    Declined,
    Cancelled,
    Refunded,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::None => "none",
            RefundStatus::Requested => "requested",
            RefundStatus::Approved => "approved",
            RefundStatus::Rejected => "rejected",
            RefundStatus::Declined => "declined",
            RefundStatus::Cancelled => "cancelled",
            RefundStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefundStatus::Approved
                | RefundStatus::Rejected
                | RefundStatus::Declined
                | RefundStatus::Cancelled
                | RefundStatus::Refunded
        )
    }

    /// Itens nesses estados não entram mais no subtotal do pedido.
    pub fn leaves_totals(&self) -> bool {
        matches!(
            self,
            RefundStatus::Approved | RefundStatus::Refunded | RefundStatus::Rejected
        )
    }

    /// `none -> requested` (ou rejeição final) é a única entrada permitida.
    pub fn ensure_can_request(self) -> Result<(), AppError> {
        match self {
            RefundStatus::None => Ok(()),
            current => Err(AppError::InvalidRefundState { current }),
        }
    }

    /// Cancelar e responder só valem a partir de `requested`.
    pub fn ensure_requested(self) -> Result<(), AppError> {
        match self {
            RefundStatus::Requested => Ok(()),
            current => Err(AppError::InvalidRefundState { current }),
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rótulo para a UX: o pedido já tinha sido entregue (reembolso) ou não (rejeição).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundMode {
    Refund,
    Reject,
}

impl RefundMode {
    pub fn for_delivery(delivered_at: Option<DateTime<Utc>>) -> Self {
        if delivered_at.is_some() {
            RefundMode::Refund
        } else {
            RefundMode::Reject
        }
    }
}

// --- Structs de Operação ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    #[schema(example = "ORD-20250110-4F2A9C")]
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    pub is_external: bool,
    pub is_paid: bool,
    pub payment_method: PaymentMethod,
    #[schema(example = "300.00")]
    pub subtotal: Decimal,
    #[schema(example = "30.00")]
    pub tax: Decimal,
    #[schema(example = "330.00")]
    pub total: Decimal,
    #[schema(example = "CDF")]
    pub currency: String,
    pub refund_status: RefundStatus,
    pub refund_requested: bool,
    pub refund_reason: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_expires_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    #[schema(ignore)]
    pub stock_deducted: bool,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: String,
    pub delivery_address: String,
    pub delivery_city: String,
    pub delivery_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal: self.subtotal,
            tax: self.tax,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub variation_id: Option<Uuid>,
    pub product_name: String,
    #[schema(example = 2)]
    pub quantity: i32,
    #[schema(example = "50.00")]
    pub price: Decimal,
    #[schema(example = "100.00")]
    pub total: Decimal,
    pub refund_status: RefundStatus,
    pub refund_requested: bool,
    pub refund_reason: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Trio monetário persistido no pedido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub header: Order,
    pub items: Vec<OrderItem>,
}

/// Resposta das ações de reembolso: o registro atualizado + o modo.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOutcome<T> {
    #[serde(flatten)]
    pub record: T,
    pub mode: RefundMode,
}

// --- Checkout ---

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItemRequest {
    /// Ids inválidos viram `null` em vez de rejeitar o pedido.
    pub product_id: Option<String>,
    pub variation_id: Option<String>,

    #[validate(length(min = 1, message = "O nome do produto é obrigatório."))]
    pub product_name: String,

    #[validate(range(min = 1, max = 10000, message = "A quantidade deve estar entre 1 e 10000."))]
    pub quantity: i32,

    #[validate(custom(function = "validate_amount"))]
    #[schema(example = "50.00")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "O nome do cliente é obrigatório."))]
    pub customer_name: String,
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    pub customer_email: Option<String>,
    #[validate(length(min = 6, message = "O telefone é obrigatório."))]
    pub customer_phone: String,
    #[validate(length(min = 1, message = "O endereço é obrigatório."))]
    pub delivery_address: String,
    #[validate(length(min = 1, message = "A cidade é obrigatória."))]
    pub delivery_city: String,
    pub delivery_notes: Option<String>,

    pub payment_method: PaymentMethod,

    /// Referência KPay já confirmada (fluxo de "finalize" sem pedido).
    pub payment_reference: Option<String>,

    #[serde(default)]
    pub is_external: bool,
    /// Taxa de transporte fixa dos pedidos externos.
    #[validate(custom(function = "validate_amount"))]
    pub transport_fee: Option<Decimal>,

    pub currency: Option<String>,

    #[validate(length(min = 1, message = "O pedido precisa de pelo menos um item."), nested)]
    pub items: Vec<CreateOrderItemRequest>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_none_can_be_requested() {
        assert!(RefundStatus::None.ensure_can_request().is_ok());
        for status in [
            RefundStatus::Requested,
            RefundStatus::Approved,
            RefundStatus::Rejected,
            RefundStatus::Declined,
            RefundStatus::Cancelled,
            RefundStatus::Refunded,
        ] {
            let err = status.ensure_can_request().unwrap_err();
            assert!(matches!(err, AppError::InvalidRefundState { current } if current == status));
        }
    }

    #[test]
    fn only_requested_can_be_answered() {
        assert!(RefundStatus::Requested.ensure_requested().is_ok());
        for status in [
            RefundStatus::None,
            RefundStatus::Approved,
            RefundStatus::Rejected,
            RefundStatus::Declined,
            RefundStatus::Cancelled,
            RefundStatus::Refunded,
        ] {
            assert!(status.ensure_requested().is_err());
        }
    }

    #[test]
    fn terminal_and_total_exclusion_sets() {
        assert!(!RefundStatus::None.is_terminal());
        assert!(!RefundStatus::Requested.is_terminal());
        assert!(RefundStatus::Cancelled.is_terminal());

        // Pedido de reembolso cancelado volta a contar no total.
        assert!(!RefundStatus::Cancelled.leaves_totals());
        assert!(!RefundStatus::Requested.leaves_totals());
        assert!(RefundStatus::Approved.leaves_totals());
        assert!(RefundStatus::Rejected.leaves_totals());
        assert!(RefundStatus::Refunded.leaves_totals());

        // Recusa do administrador encerra o pedido mas o item segue vendido.
        assert!(RefundStatus::Declined.is_terminal());
        assert!(!RefundStatus::Declined.leaves_totals());
    }

    #[test]
    fn closed_orders_keep_their_status() {
        assert!(OrderStatus::Pending.ensure_can_move_to(OrderStatus::Delivered).is_ok());
        assert!(OrderStatus::Delivered.ensure_can_move_to(OrderStatus::Refunded).is_ok());
        assert!(OrderStatus::Cancelled.ensure_can_move_to(OrderStatus::Cancelled).is_ok());

        let err = OrderStatus::Cancelled.ensure_can_move_to(OrderStatus::Delivered).unwrap_err();
        assert!(matches!(err, AppError::OrderClosed { current: OrderStatus::Cancelled }));
        assert!(OrderStatus::Refunded.ensure_can_move_to(OrderStatus::Pending).is_err());
    }

    #[test]
    fn mode_follows_delivery() {
        assert_eq!(RefundMode::for_delivery(Some(Utc::now())), RefundMode::Refund);
        assert_eq!(RefundMode::for_delivery(None), RefundMode::Reject);
    }

    #[test]
    fn create_order_request_requires_items() {
        let payload = CreateOrderRequest {
            customer_name: "Amani".into(),
            customer_email: None,
            customer_phone: "0990000000".into(),
            delivery_address: "Av. Kasa-Vubu 12".into(),
            delivery_city: "Kinshasa".into(),
            delivery_notes: None,
            payment_method: PaymentMethod::CashOnDelivery,
            payment_reference: None,
            is_external: false,
            transport_fee: None,
            currency: None,
            items: vec![],
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("items"));
    }

    fn line(price: Decimal, quantity: i32) -> CreateOrderItemRequest {
        CreateOrderItemRequest {
            product_id: None,
            variation_id: None,
            product_name: "Camisa".into(),
            quantity,
            price,
        }
    }

    #[test]
    fn checkout_lines_are_bounded() {
        assert!(line(Decimal::from(50), 2).validate().is_ok());
        assert!(line(Decimal::MAX, 2).validate().is_err());
        assert!(line(Decimal::from(-1), 1).validate().is_err());
        assert!(line(Decimal::from(50), 0).validate().is_err());
        assert!(line(Decimal::from(50), i32::MAX).validate().is_err());
    }
}
