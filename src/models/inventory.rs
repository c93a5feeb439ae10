// src/models/inventory.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Produtos (só o que o estoque precisa) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub track_quantity: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "stock_movement_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StockMovementReason {
    Delivery,
    RefundRestock,
}

// --- STOCK MOVEMENT (Histórico) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub order_item_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub variation_id: Option<Uuid>,
    pub quantity_changed: i32,
    pub reason: StockMovementReason,
    pub actor_role: Option<String>,
    pub actor_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Qual contador uma linha do pedido movimenta.
/// A variação, quando existe, manda sobre o estoque do produto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockTarget {
    Variation(Uuid),
    Product(Uuid),
}

impl StockTarget {
    /// `track_quantity` é o flag do produto (None quando o produto não foi encontrado).
    pub fn resolve(
        variation_id: Option<Uuid>,
        product_id: Option<Uuid>,
        track_quantity: Option<bool>,
    ) -> Option<Self> {
        if let Some(variation_id) = variation_id {
            return Some(StockTarget::Variation(variation_id));
        }
        match (product_id, track_quantity) {
            (Some(product_id), Some(true)) => Some(StockTarget::Product(product_id)),
            _ => None,
        }
    }
}

/// Novo saldo após aplicar `delta`, nunca abaixo de zero.
pub fn clamp_stock(current: i32, delta: i32) -> i32 {
    current.saturating_add(delta).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variation_wins_over_product() {
        let product = Uuid::new_v4();
        let variation = Uuid::new_v4();
        assert_eq!(
            StockTarget::resolve(Some(variation), Some(product), Some(false)),
            Some(StockTarget::Variation(variation))
        );
    }

    #[test]
    fn product_stock_only_when_tracked() {
        let product = Uuid::new_v4();
        assert_eq!(
            StockTarget::resolve(None, Some(product), Some(true)),
            Some(StockTarget::Product(product))
        );
        assert_eq!(StockTarget::resolve(None, Some(product), Some(false)), None);
        assert_eq!(StockTarget::resolve(None, Some(product), None), None);
        assert_eq!(StockTarget::resolve(None, None, Some(true)), None);
    }

    #[test]
    fn stock_never_goes_negative() {
        assert_eq!(clamp_stock(5, -3), 2);
        assert_eq!(clamp_stock(2, -3), 0);
        assert_eq!(clamp_stock(0, -1), 0);
        assert_eq!(clamp_stock(0, 4), 4);
        assert_eq!(clamp_stock(i32::MIN + 1, -10), 0);
    }

    #[test]
    fn any_sequence_of_moves_stays_non_negative() {
        let deltas = [-4, 3, -10, 7, -1, -1, 12, -30, 2];
        let mut stock = 3;
        for delta in deltas {
            stock = clamp_stock(stock, delta);
            assert!(stock >= 0);
        }
        assert_eq!(stock, 2);
    }
}
