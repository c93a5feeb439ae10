// src/models/notification.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Admin,
    Customer,
    Rider,
}

impl RecipientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientRole::Admin => "admin",
            RecipientRole::Customer => "customer",
            RecipientRole::Rider => "rider",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    OrderStatusChanged,
    RefundRequested,
    RefundApproved,
    RefundRejected,
    RiderAssigned,
    AssignmentAccepted,
    AssignmentRejected,
    AssignmentCompleted,
    PaymentCompleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderCreated => "order_created",
            NotificationKind::OrderStatusChanged => "order_status_changed",
            NotificationKind::RefundRequested => "refund_requested",
            NotificationKind::RefundApproved => "refund_approved",
            NotificationKind::RefundRejected => "refund_rejected",
            NotificationKind::RiderAssigned => "rider_assigned",
            NotificationKind::AssignmentAccepted => "assignment_accepted",
            NotificationKind::AssignmentRejected => "assignment_rejected",
            NotificationKind::AssignmentCompleted => "assignment_completed",
            NotificationKind::PaymentCompleted => "payment_completed",
        }
    }
}

/// Notificação a ser gravada no outbox junto com a mudança de estado.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_user_id: Option<Uuid>,
    pub recipient_role: RecipientRole,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub meta: Value,
    /// Entidade que disparou o evento (pedido, item...).
    pub subject_id: Uuid,
    /// Transição do evento (status novo, entregador). Entra na chave de dedupe.
    pub transition: Option<String>,
}

impl NewNotification {
    /// Mesma chave dentro da janela = entregue no máximo uma vez.
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.kind.as_str(),
            self.recipient_role.as_str(),
            self.recipient_user_id.map(|id| id.to_string()).unwrap_or_default(),
            self.subject_id,
            self.transition.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub recipient_user_id: Option<Uuid>,
    pub recipient_role: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub meta: Value,
    pub dedupe_key: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Formato aceito pelo despachante (insert direto ou POST interno).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationPayload {
    pub recipient_user_id: Option<Uuid>,
    pub recipient_role: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub meta: Value,
}

impl From<&OutboxEntry> for NotificationPayload {
    fn from(entry: &OutboxEntry) -> Self {
        Self {
            recipient_user_id: entry.recipient_user_id,
            recipient_role: entry.recipient_role.clone(),
            kind: entry.kind.clone(),
            title: entry.title.clone(),
            body: entry.body.clone(),
            meta: entry.meta.clone(),
        }
    }
}
