// src/services/inventory_service.rs

use sqlx::{Acquire, PgConnection};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::InventoryRepository,
    models::{
        inventory::{StockMovementReason, StockTarget, clamp_stock},
        order::{Order, OrderItem},
    },
};

/// Sinal da movimentação: entrega baixa, reembolso devolve.
pub fn signed_quantity(reason: StockMovementReason, quantity: i32) -> i32 {
    match reason {
        StockMovementReason::Delivery => -quantity,
        StockMovementReason::RefundRestock => quantity,
    }
}

/// Itens cujo estoque sai na entrega: os que já foram reembolsados ou
/// rejeitados antes da confirmação não saem da prateleira.
pub fn items_to_deduct(items: &[OrderItem]) -> impl Iterator<Item = &OrderItem> {
    items.iter().filter(|item| !item.refund_status.leaves_totals())
}

#[derive(Clone)]
pub struct InventoryService {
    inventory_repo: InventoryRepository,
}

impl InventoryService {
    pub fn new(inventory_repo: InventoryRepository) -> Self {
        Self { inventory_repo }
    }

    // --- BAIXA NA ENTREGA ---
    /// Chamado uma única vez, quando o pedido passa para `delivered`.
    /// Cada item roda no seu savepoint: falha num item é logada e não derruba os outros.
    pub async fn deduct_for_delivery(
        &self,
        conn: &mut PgConnection,
        order_id: Uuid,
        items: &[OrderItem],
    ) -> usize {
        let mut moved = 0;
        for item in items_to_deduct(items) {
            if self
                .adjust_best_effort(conn, order_id, item, StockMovementReason::Delivery)
                .await
            {
                moved += 1;
            }
        }
        tracing::info!("📦 Baixa de estoque do pedido {}: {} itens", order_id, moved);
        moved
    }

    // --- DEVOLUÇÃO NO REEMBOLSO ---
    /// Só devolve se a baixa da entrega aconteceu (`stock_deducted`).
    pub async fn restock_items(
        &self,
        conn: &mut PgConnection,
        order: &Order,
        items: &[OrderItem],
    ) -> usize {
        if !order.stock_deducted {
            tracing::info!(
                "Pedido {} nunca baixou estoque; devolução ignorada",
                order.order_number
            );
            return 0;
        }

        let mut moved = 0;
        for item in items {
            if self
                .adjust_best_effort(conn, order.id, item, StockMovementReason::RefundRestock)
                .await
            {
                moved += 1;
            }
        }
        moved
    }

    async fn adjust_best_effort(
        &self,
        conn: &mut PgConnection,
        order_id: Uuid,
        item: &OrderItem,
        reason: StockMovementReason,
    ) -> bool {
        let result: Result<bool, AppError> = async {
            let mut sp = (&mut *conn).begin().await?;
            let moved = self.adjust_item(&mut sp, order_id, item, reason).await?;
            sp.commit().await?;
            Ok(moved)
        }
        .await;

        match result {
            Ok(moved) => moved,
            Err(e) => {
                tracing::warn!(
                    "Falha ao movimentar estoque do item {} ({:?}): {}",
                    item.id,
                    reason,
                    e
                );
                false
            }
        }
    }

    /// Aplica o delta no contador certo (variação ou produto) e grava o histórico.
    async fn adjust_item(
        &self,
        conn: &mut PgConnection,
        order_id: Uuid,
        item: &OrderItem,
        reason: StockMovementReason,
    ) -> Result<bool, AppError> {
        let tracked = match (item.variation_id, item.product_id) {
            (None, Some(product_id)) => {
                self.inventory_repo
                    .product_tracks_quantity(&mut *conn, product_id)
                    .await?
            }
            _ => None,
        };

        let Some(target) = StockTarget::resolve(item.variation_id, item.product_id, tracked) else {
            return Ok(false);
        };

        let delta = signed_quantity(reason, item.quantity);

        let applied = match target {
            StockTarget::Variation(variation_id) => {
                let Some(current) = self
                    .inventory_repo
                    .variation_stock_for_update(&mut *conn, variation_id)
                    .await?
                else {
                    tracing::warn!("Variação {} não existe mais", variation_id);
                    return Ok(false);
                };
                let new_stock = clamp_stock(current, delta);
                self.inventory_repo
                    .set_variation_stock(&mut *conn, variation_id, new_stock)
                    .await?;
                new_stock - current
            }
            StockTarget::Product(product_id) => {
                let Some(row) = self
                    .inventory_repo
                    .product_stock_for_update(&mut *conn, product_id)
                    .await?
                else {
                    return Ok(false);
                };
                let new_stock = clamp_stock(row.stock, delta);
                self.inventory_repo
                    .set_product_stock(&mut *conn, product_id, new_stock)
                    .await?;
                new_stock - row.stock
            }
        };

        self.inventory_repo
            .record_stock_movement(
                &mut *conn,
                order_id,
                item.id,
                item.product_id,
                item.variation_id,
                applied,
                reason,
            )
            .await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::RefundStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn item(status: RefundStatus) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            product_id: Some(Uuid::new_v4()),
            variation_id: None,
            product_name: "Camiseta".into(),
            quantity: 3,
            price: Decimal::from(10),
            total: Decimal::from(30),
            refund_status: status,
            refund_requested: false,
            refund_reason: None,
            refund_requested_at: None,
            refund_expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn delivery_takes_and_restock_gives_back() {
        assert_eq!(signed_quantity(StockMovementReason::Delivery, 3), -3);
        assert_eq!(signed_quantity(StockMovementReason::RefundRestock, 3), 3);
    }

    #[test]
    fn refunded_items_are_not_deducted() {
        let items = vec![
            item(RefundStatus::None),
            item(RefundStatus::Approved),
            item(RefundStatus::Requested),
            item(RefundStatus::Refunded),
            item(RefundStatus::Cancelled),
        ];
        let picked: Vec<_> = items_to_deduct(&items).map(|i| i.refund_status).collect();
        assert_eq!(
            picked,
            vec![RefundStatus::None, RefundStatus::Requested, RefundStatus::Cancelled]
        );
    }
}
