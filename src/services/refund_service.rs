// src/services/refund_service.rs

//! Máquina de estados de reembolso, para o pedido inteiro ou para um item.
//!
//! `none -> requested -> {approved | rejected}` e `requested -> cancelled`.
//! Cada ação trava a linha do pedido (`FOR UPDATE`) antes de ler os itens, então
//! duas aprovações simultâneas no mesmo pedido nunca recalculam sobre dados velhos.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Acquire, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{OrderRepository, order_repo::RefundFields},
    middleware::auth::AuthenticatedUser,
    models::{
        auth::Role,
        order::{Order, OrderItem, OrderStatus, RefundMode, RefundOutcome, RefundStatus},
        refund::RefundDecision,
    },
    services::{
        inventory_service::InventoryService,
        notification_service::{self, NotificationService},
        order_calculator::{all_items_closed, recompute_totals},
        order_service::{OrderService, ensure_can_access},
    },
};

pub const REFUND_WINDOW_HOURS: i64 = 24;

/// Resultado da validação de um pedido de reembolso.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundPlan {
    pub fields: RefundFields,
    pub mode: RefundMode,
    /// `false` na rejeição final do cliente (não há o que revisar).
    pub notify_admin: bool,
}

impl RefundPlan {
    pub fn is_final_reject(&self) -> bool {
        self.fields.status == RefundStatus::Rejected
    }
}

pub fn plan_refund_request(
    delivered_at: Option<DateTime<Utc>>,
    admin_initiated: bool,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<RefundPlan, AppError> {
    let window = Duration::hours(REFUND_WINDOW_HOURS);

    if let Some(delivered_at) = delivered_at {
        if now - delivered_at > window {
            return Err(AppError::RefundExpired);
        }
    }

    let mode = RefundMode::for_delivery(delivered_at);

    if delivered_at.is_none() && !admin_initiated {
        return Ok(RefundPlan {
            fields: RefundFields {
                status: RefundStatus::Rejected,
                requested: false,
                reason: Some(reason.to_string()),
                requested_at: Some(now),
                expires_at: None,
            },
            mode,
            notify_admin: false,
        });
    }

    Ok(RefundPlan {
        fields: RefundFields {
            status: RefundStatus::Requested,
            requested: true,
            reason: Some(reason.to_string()),
            requested_at: Some(now),
            expires_at: Some(now + window),
        },
        mode,
        notify_admin: true,
    })
}

/// Cancelar volta os campos ao estado "sem pedido", marcado como `cancelled`.
pub fn cancelled_fields() -> RefundFields {
    RefundFields {
        status: RefundStatus::Cancelled,
        requested: false,
        reason: None,
        requested_at: None,
        expires_at: None,
    }
}

/// Resposta do administrador. A recusa não tira o item do total.
pub fn answered_status(decision: RefundDecision) -> RefundStatus {
    match decision {
        RefundDecision::Approve => RefundStatus::Approved,
        RefundDecision::Reject => RefundStatus::Declined,
    }
}

/// Itens alcançados pela aprovação do pedido inteiro: todos que ainda contam no total.
pub fn items_for_order_approval(items: &[OrderItem]) -> Vec<Uuid> {
    items
        .iter()
        .filter(|item| !item.refund_status.leaves_totals())
        .map(|item| item.id)
        .collect()
}

/// Status final do pedido quando nenhum item conta mais no total.
pub fn closing_status(mode: RefundMode) -> OrderStatus {
    match mode {
        RefundMode::Refund => OrderStatus::Refunded,
        RefundMode::Reject => OrderStatus::Cancelled,
    }
}

#[derive(Clone)]
pub struct RefundService {
    order_repo: OrderRepository,
    orders: OrderService,
    inventory: InventoryService,
    notifier: NotificationService,
}

impl RefundService {
    pub fn new(
        order_repo: OrderRepository,
        orders: OrderService,
        inventory: InventoryService,
        notifier: NotificationService,
    ) -> Self {
        Self {
            order_repo,
            orders,
            inventory,
            notifier,
        }
    }

    // =========================================================================
    //  ITEM
    // =========================================================================

    pub async fn request_item_refund<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        item_id: Uuid,
        reason: &str,
        admin_initiated: bool,
    ) -> Result<RefundOutcome<OrderItem>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let (order, item) = self.lock_item(&mut tx, item_id).await?;
        ensure_can_access(actor, &order)?;

        item.refund_status.ensure_can_request()?;

        let admin_initiated = admin_initiated && actor.role == Role::Admin;
        let plan = plan_refund_request(order.delivered_at, admin_initiated, reason, Utc::now())?;

        let updated = self
            .order_repo
            .set_item_refund(&mut *tx, item.id, &plan.fields)
            .await?;

        if plan.notify_admin {
            self.notifier
                .enqueue(
                    &mut tx,
                    notification_service::refund_requested(&order, Some(&updated), reason),
                )
                .await;
        } else {
            // Item rejeitado sai do total já.
            self.settle_totals(&mut tx, &order, plan.mode).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Reembolso do item {} ({}): {}",
            updated.id,
            order.order_number,
            updated.refund_status
        );
        Ok(RefundOutcome { record: updated, mode: plan.mode })
    }

    pub async fn cancel_item_refund<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        item_id: Uuid,
    ) -> Result<RefundOutcome<OrderItem>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let (order, item) = self.lock_item(&mut tx, item_id).await?;
        ensure_can_access(actor, &order)?;

        item.refund_status.ensure_requested()?;

        let updated = self
            .order_repo
            .set_item_refund(&mut *tx, item.id, &cancelled_fields())
            .await?;

        tx.commit().await?;
        Ok(RefundOutcome {
            record: updated,
            mode: RefundMode::for_delivery(order.delivered_at),
        })
    }

    pub async fn respond_item_refund<'e, E>(
        &self,
        executor: E,
        item_id: Uuid,
        decision: RefundDecision,
    ) -> Result<RefundOutcome<OrderItem>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let (order, item) = self.lock_item(&mut tx, item_id).await?;

        item.refund_status.ensure_requested()?;
        let mode = RefundMode::for_delivery(order.delivered_at);

        let updated = match decision {
            RefundDecision::Approve => {
                let updated = self
                    .order_repo
                    .set_item_refund_status(&mut *tx, item.id, RefundStatus::Approved)
                    .await?;

                self.inventory
                    .restock_items(&mut tx, &order, std::slice::from_ref(&updated))
                    .await;
                self.settle_totals(&mut tx, &order, mode).await?;
                updated
            }
            RefundDecision::Reject => {
                self.order_repo
                    .set_item_refund_status(&mut *tx, item.id, answered_status(decision))
                    .await?
            }
        };

        if let Some(notification) = notification_service::refund_answered(
            &order,
            Some(&updated),
            decision == RefundDecision::Approve,
        ) {
            self.notifier.enqueue(&mut tx, notification).await;
        }

        tx.commit().await?;

        tracing::info!("Reembolso do item {} respondido: {}", updated.id, updated.refund_status);
        Ok(RefundOutcome { record: updated, mode })
    }

    // =========================================================================
    //  PEDIDO INTEIRO
    // =========================================================================

    pub async fn request_order_refund<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        order_id: Uuid,
        reason: &str,
        admin_initiated: bool,
    ) -> Result<RefundOutcome<Order>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let order = self.lock_order(&mut tx, order_id).await?;
        ensure_can_access(actor, &order)?;

        order.refund_status.ensure_can_request()?;

        let admin_initiated = admin_initiated && actor.role == Role::Admin;
        let plan = plan_refund_request(order.delivered_at, admin_initiated, reason, Utc::now())?;

        let mut updated = self
            .order_repo
            .set_order_refund(&mut *tx, order.id, &plan.fields)
            .await?;

        if plan.notify_admin {
            self.notifier
                .enqueue(
                    &mut tx,
                    notification_service::refund_requested(&updated, None, reason),
                )
                .await;
        } else if plan.is_final_reject() {
            // Cliente desistiu antes da entrega: o pedido é cancelado.
            updated = self
                .orders
                .apply_status(&mut tx, &updated, OrderStatus::Cancelled)
                .await?;
        }

        tx.commit().await?;

        tracing::info!("Reembolso do pedido {}: {}", updated.order_number, updated.refund_status);
        Ok(RefundOutcome { record: updated, mode: plan.mode })
    }

    pub async fn cancel_order_refund<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        order_id: Uuid,
    ) -> Result<RefundOutcome<Order>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let order = self.lock_order(&mut tx, order_id).await?;
        ensure_can_access(actor, &order)?;

        order.refund_status.ensure_requested()?;

        let updated = self
            .order_repo
            .set_order_refund(&mut *tx, order.id, &cancelled_fields())
            .await?;

        tx.commit().await?;
        Ok(RefundOutcome {
            mode: RefundMode::for_delivery(updated.delivered_at),
            record: updated,
        })
    }

    /// Aprovação do pedido inteiro: todo item que ainda conta no total é aprovado
    /// e devolvido ao estoque, e o pedido fecha (`refunded` ou `cancelled`).
    pub async fn respond_order_refund<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        decision: RefundDecision,
    ) -> Result<RefundOutcome<Order>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let order = self.lock_order(&mut tx, order_id).await?;

        order.refund_status.ensure_requested()?;
        let mode = RefundMode::for_delivery(order.delivered_at);

        let updated = match decision {
            RefundDecision::Approve => {
                let order = self
                    .order_repo
                    .set_order_refund_status(&mut *tx, order.id, answered_status(decision))
                    .await?;

                let items = self.order_repo.list_items(&mut *tx, order.id).await?;
                let approved = self
                    .order_repo
                    .set_items_refund_status(
                        &mut *tx,
                        order.id,
                        &items_for_order_approval(&items),
                        RefundStatus::Approved,
                    )
                    .await?;
                self.inventory.restock_items(&mut tx, &order, &approved).await;

                let items = self.order_repo.list_items(&mut *tx, order.id).await?;
                let totals = recompute_totals(&items, order.is_external, order.totals());
                self.order_repo.update_totals(&mut *tx, order.id, totals).await?;

                self.orders
                    .apply_status(&mut tx, &order, closing_status(mode))
                    .await?
            }
            RefundDecision::Reject => {
                self.order_repo
                    .set_order_refund_status(&mut *tx, order.id, answered_status(decision))
                    .await?
            }
        };

        if let Some(notification) =
            notification_service::refund_answered(&updated, None, decision == RefundDecision::Approve)
        {
            self.notifier.enqueue(&mut tx, notification).await;
        }

        tx.commit().await?;

        tracing::info!("Reembolso do pedido {} respondido: {}", updated.order_number, updated.refund_status);
        Ok(RefundOutcome { record: updated, mode })
    }

    // ---
    // Helpers
    // ---

    async fn lock_order(&self, conn: &mut PgConnection, order_id: Uuid) -> Result<Order, AppError> {
        self.order_repo
            .find_by_id_for_update(conn, order_id)
            .await?
            .ok_or(AppError::OrderNotFound)
    }

    /// Trava o pedido dono do item e relê o item já sob o lock.
    async fn lock_item(
        &self,
        conn: &mut PgConnection,
        item_id: Uuid,
    ) -> Result<(Order, OrderItem), AppError> {
        let item = self
            .order_repo
            .find_item(&mut *conn, item_id)
            .await?
            .ok_or(AppError::OrderItemNotFound)?;

        let order = self.lock_order(&mut *conn, item.order_id).await?;

        let item = self
            .order_repo
            .find_item(&mut *conn, item_id)
            .await?
            .ok_or(AppError::OrderItemNotFound)?;

        Ok((order, item))
    }

    /// Recalcula a partir da lista atual de itens e fecha o pedido se nada mais conta.
    async fn settle_totals(
        &self,
        conn: &mut PgConnection,
        order: &Order,
        mode: RefundMode,
    ) -> Result<(), AppError> {
        let items = self.order_repo.list_items(&mut *conn, order.id).await?;
        let totals = recompute_totals(&items, order.is_external, order.totals());
        self.order_repo.update_totals(&mut *conn, order.id, totals).await?;

        if all_items_closed(&items) {
            self.orders
                .apply_status(&mut *conn, order, closing_status(mode))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hours: i64, minutes: i64, seconds: i64) -> Duration {
        Duration::hours(hours) + Duration::minutes(minutes) + Duration::seconds(seconds)
    }

    #[test]
    fn refund_window_is_24_hours() {
        let delivered = Utc::now();

        let late = plan_refund_request(Some(delivered), false, "quebrado", delivered + at(24, 0, 1));
        assert!(matches!(late, Err(AppError::RefundExpired)));

        let in_time =
            plan_refund_request(Some(delivered), false, "quebrado", delivered + at(23, 59, 0)).unwrap();
        assert_eq!(in_time.fields.status, RefundStatus::Requested);
        assert_eq!(in_time.mode, RefundMode::Refund);

        let boundary = plan_refund_request(Some(delivered), false, "quebrado", delivered + at(24, 0, 0));
        assert!(boundary.is_ok());
    }

    #[test]
    fn delivered_request_opens_review() {
        let now = Utc::now();
        let plan = plan_refund_request(Some(now - Duration::hours(2)), false, "tamanho errado", now).unwrap();

        assert!(plan.notify_admin);
        assert!(plan.fields.requested);
        assert_eq!(plan.fields.reason.as_deref(), Some("tamanho errado"));
        assert_eq!(plan.fields.requested_at, Some(now));
        assert_eq!(plan.fields.expires_at, Some(now + Duration::hours(24)));
    }

    #[test]
    fn undelivered_customer_request_is_a_final_reject() {
        let now = Utc::now();
        let plan = plan_refund_request(None, false, "desisti", now).unwrap();

        assert!(plan.is_final_reject());
        assert!(!plan.fields.requested);
        assert!(!plan.notify_admin);
        assert_eq!(plan.mode, RefundMode::Reject);
    }

    #[test]
    fn admin_initiated_undelivered_request_is_reviewable() {
        let now = Utc::now();
        let plan = plan_refund_request(None, true, "cliente ligou", now).unwrap();

        assert_eq!(plan.fields.status, RefundStatus::Requested);
        assert!(plan.notify_admin);
        assert_eq!(plan.mode, RefundMode::Reject);
    }

    #[test]
    fn cancel_clears_the_request() {
        let fields = cancelled_fields();
        assert_eq!(fields.status, RefundStatus::Cancelled);
        assert!(!fields.requested);
        assert_eq!(fields.reason, None);
        assert_eq!(fields.requested_at, None);
    }

    #[test]
    fn terminal_states_accept_no_action() {
        for status in [
            RefundStatus::Approved,
            RefundStatus::Rejected,
            RefundStatus::Declined,
            RefundStatus::Cancelled,
            RefundStatus::Refunded,
        ] {
            assert!(status.ensure_can_request().is_err());
            assert!(status.ensure_requested().is_err());
        }
    }

    fn item(total: i64, status: RefundStatus) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            product_id: None,
            variation_id: None,
            product_name: "Produto".into(),
            quantity: 1,
            price: total.into(),
            total: total.into(),
            refund_status: status,
            refund_requested: false,
            refund_reason: None,
            refund_requested_at: None,
            refund_expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn order_approval_reaches_every_item_still_sold() {
        let open = item(100, RefundStatus::None);
        let withdrawn = item(200, RefundStatus::Cancelled);
        let pending = item(50, RefundStatus::Requested);
        let declined = item(70, RefundStatus::Declined);
        let already = item(30, RefundStatus::Approved);
        let rejected = item(10, RefundStatus::Rejected);
        let items = vec![
            open.clone(),
            withdrawn.clone(),
            pending.clone(),
            declined.clone(),
            already,
            rejected,
        ];

        let ids = items_for_order_approval(&items);
        assert_eq!(ids, vec![open.id, withdrawn.id, pending.id, declined.id]);

        // Depois da aprovação em massa nada mais conta e o pedido fecha.
        let after: Vec<OrderItem> = items
            .into_iter()
            .map(|mut i| {
                if ids.contains(&i.id) {
                    i.refund_status = RefundStatus::Approved;
                }
                i
            })
            .collect();
        assert!(all_items_closed(&after));
    }

    #[test]
    fn admin_reject_is_declined_not_final_reject() {
        assert_eq!(answered_status(RefundDecision::Approve), RefundStatus::Approved);
        assert_eq!(answered_status(RefundDecision::Reject), RefundStatus::Declined);
    }

    #[test]
    fn closing_status_follows_mode() {
        assert_eq!(closing_status(RefundMode::Refund), OrderStatus::Refunded);
        assert_eq!(closing_status(RefundMode::Reject), OrderStatus::Cancelled);
    }
}
