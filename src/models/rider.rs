// src/models/rider.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rider {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub phone: String,
    /// `NULL` conta como ativo; só `false` bloqueia.
    pub active: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl Rider {
    pub fn is_active(&self) -> bool {
        self.active != Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "assignment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Reassigned,
}

impl AssignmentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AssignmentStatus::Pending | AssignmentStatus::Accepted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderAssignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub rider_id: Uuid,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Respostas que o entregador pode dar a uma atribuição.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiderResponse {
    Accepted,
    Rejected,
    Completed,
}

impl RiderResponse {
    pub fn assignment_status(&self) -> AssignmentStatus {
        match self {
            RiderResponse::Accepted => AssignmentStatus::Accepted,
            RiderResponse::Rejected => AssignmentStatus::Rejected,
            RiderResponse::Completed => AssignmentStatus::Completed,
        }
    }

    /// Status do pedido depois da resposta (rejeitado volta para a fila).
    pub fn order_status(&self) -> OrderStatus {
        match self {
            RiderResponse::Accepted => OrderStatus::Processing,
            RiderResponse::Rejected => OrderStatus::Pending,
            RiderResponse::Completed => OrderStatus::Delivered,
        }
    }
}

// --- Payloads ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRiderRequest {
    #[validate(length(min = 1, message = "O nome é obrigatório."))]
    pub name: String,
    #[validate(length(min = 6, message = "O telefone é obrigatório."))]
    pub phone: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetRiderActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignRiderRequest {
    pub rider_id: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RespondAssignmentRequest {
    pub response: RiderResponse,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderAssignmentResponse {
    pub rider: Option<Rider>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_drive_order_status() {
        assert_eq!(RiderResponse::Accepted.order_status(), OrderStatus::Processing);
        assert_eq!(RiderResponse::Completed.order_status(), OrderStatus::Delivered);
        assert_eq!(RiderResponse::Rejected.order_status(), OrderStatus::Pending);
    }

    #[test]
    fn only_pending_and_accepted_are_active() {
        assert!(AssignmentStatus::Pending.is_active());
        assert!(AssignmentStatus::Accepted.is_active());
        assert!(!AssignmentStatus::Rejected.is_active());
        assert!(!AssignmentStatus::Completed.is_active());
        assert!(!AssignmentStatus::Reassigned.is_active());
    }

    #[test]
    fn missing_active_flag_counts_as_active() {
        let mut rider = Rider {
            id: Uuid::new_v4(),
            user_id: None,
            name: "Jo".into(),
            phone: "0990000000".into(),
            active: None,
            created_at: Utc::now(),
        };
        assert!(rider.is_active());
        rider.active = Some(true);
        assert!(rider.is_active());
        rider.active = Some(false);
        assert!(!rider.is_active());
    }
}
