// src/services/rider_service.rs

use sqlx::{Acquire, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{OrderRepository, RiderRepository},
    middleware::auth::AuthenticatedUser,
    models::{
        order::{Order, OrderStatus},
        rider::{
            AssignRiderRequest, CreateRiderRequest, OrderAssignment, OrderAssignmentResponse,
            RespondAssignmentRequest, Rider, RiderResponse,
        },
    },
    services::{
        notification_service::{self, NotificationService},
        order_service::{OrderService, ensure_can_access},
    },
};

/// Pré-condições da atribuição inicial.
pub fn ensure_assignable(order: &Order, rider: &Rider) -> Result<(), AppError> {
    if order.status != OrderStatus::Pending {
        return Err(AppError::OrderNotPending);
    }
    if !rider.is_active() {
        return Err(AppError::RiderInactive);
    }
    Ok(())
}

#[derive(Clone)]
pub struct RiderService {
    rider_repo: RiderRepository,
    order_repo: OrderRepository,
    orders: OrderService,
    notifier: NotificationService,
}

impl RiderService {
    pub fn new(
        rider_repo: RiderRepository,
        order_repo: OrderRepository,
        orders: OrderService,
        notifier: NotificationService,
    ) -> Self {
        Self {
            rider_repo,
            order_repo,
            orders,
            notifier,
        }
    }

    // =========================================================================
    //  CADASTRO
    // =========================================================================

    pub async fn create_rider<'e, E>(&self, executor: E, payload: &CreateRiderRequest) -> Result<Rider, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let rider = self
            .rider_repo
            .create_rider(&mut *tx, &payload.name, &payload.phone, payload.user_id)
            .await?;
        tx.commit().await?;
        tracing::info!("🛵 Entregador {} cadastrado", rider.name);
        Ok(rider)
    }

    pub async fn list_riders<'e, E>(&self, executor: E) -> Result<Vec<Rider>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let riders = self.rider_repo.list_riders(&mut *tx).await?;
        tx.commit().await?;
        Ok(riders)
    }

    pub async fn set_active<'e, E>(&self, executor: E, rider_id: Uuid, active: bool) -> Result<Rider, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let rider = self.rider_repo.set_active(&mut *tx, rider_id, active).await?;
        tx.commit().await?;
        Ok(rider)
    }

    // =========================================================================
    //  ATRIBUIÇÃO
    // =========================================================================

    pub async fn assign<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        payload: &AssignRiderRequest,
    ) -> Result<OrderAssignment, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let order = self.lock_order(&mut tx, order_id).await?;
        let rider = self.find_rider(&mut tx, payload.rider_id).await?;
        ensure_assignable(&order, &rider)?;

        // Uma atribuição antiga que ficou ativa não pode sobreviver à nova.
        self.rider_repo.retire_active(&mut *tx, order.id).await?;

        let assignment = self
            .place(&mut tx, &order, &rider, payload.notes.as_deref())
            .await?;

        tx.commit().await?;
        Ok(assignment)
    }

    /// Troca o entregador em qualquer status do pedido.
    pub async fn reassign<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        payload: &AssignRiderRequest,
    ) -> Result<OrderAssignment, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let order = self.lock_order(&mut tx, order_id).await?;
        let rider = self.find_rider(&mut tx, payload.rider_id).await?;
        if !rider.is_active() {
            return Err(AppError::RiderInactive);
        }

        if let Some(previous) = self.rider_repo.latest_for_order(&mut *tx, order.id).await? {
            tracing::info!(
                "Pedido {}: atribuição {} ({:?}) substituída",
                order.order_number,
                previous.id,
                previous.status
            );
        }
        self.rider_repo.retire_active(&mut *tx, order.id).await?;

        let assignment = self
            .place(&mut tx, &order, &rider, payload.notes.as_deref())
            .await?;

        tx.commit().await?;
        Ok(assignment)
    }

    /// Resposta do entregador; `completed` dispara a cascata de entrega.
    pub async fn respond<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        assignment_id: Uuid,
        payload: &RespondAssignmentRequest,
    ) -> Result<OrderAssignment, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let rider = self
            .rider_repo
            .find_rider_by_user(&mut *tx, actor.id)
            .await?
            .ok_or(AppError::RiderNotFound)?;

        // Descobre o pedido, trava o pedido, e só então trava a atribuição.
        let Some(found) = self.rider_repo.find_assignment(&mut *tx, assignment_id).await? else {
            return Err(AppError::AssignmentNotFound);
        };
        let order = self.lock_order(&mut tx, found.order_id).await?;
        let assignment = self
            .rider_repo
            .find_assignment_for_update(&mut *tx, assignment_id)
            .await?
            .ok_or(AppError::AssignmentNotFound)?;

        if assignment.rider_id != rider.id {
            return Err(AppError::Forbidden);
        }
        if !assignment.status.is_active() {
            return Err(AppError::AssignmentNotFound);
        }

        let updated = self
            .rider_repo
            .update_assignment_status(
                &mut *tx,
                assignment.id,
                payload.response.assignment_status(),
                payload.notes.as_deref(),
            )
            .await?;

        self.orders
            .apply_status(&mut tx, &order, payload.response.order_status())
            .await?;

        if payload.response == RiderResponse::Rejected {
            self.notifier
                .enqueue(&mut tx, notification_service::rider_rejected(&order, &rider))
                .await;
        }

        tx.commit().await?;

        tracing::info!(
            "🛵 {} respondeu {:?} ao pedido {}",
            rider.name,
            payload.response,
            order.order_number
        );
        Ok(updated)
    }

    pub async fn order_assignment<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        order_id: Uuid,
    ) -> Result<OrderAssignmentResponse, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let order = self
            .order_repo
            .find_by_id(&mut *tx, order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        ensure_can_access(actor, &order)?;

        let rider = self.rider_repo.active_rider_for_order(&mut *tx, order_id).await?;
        tx.commit().await?;
        Ok(OrderAssignmentResponse { rider })
    }

    pub async fn my_assignments<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
    ) -> Result<Vec<OrderAssignment>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let rider = self
            .rider_repo
            .find_rider_by_user(&mut *tx, actor.id)
            .await?
            .ok_or(AppError::RiderNotFound)?;
        let assignments = self.rider_repo.list_for_rider(&mut *tx, rider.id).await?;
        tx.commit().await?;
        Ok(assignments)
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

    async fn find_rider(&self, conn: &mut PgConnection, rider_id: Uuid) -> Result<Rider, AppError> {
        self.rider_repo
            .find_rider(conn, rider_id)
            .await?
            .ok_or(AppError::RiderNotFound)
    }

    /// Grava a nova atribuição, põe o pedido em `assigned` e avisa o entregador.
    async fn place(
        &self,
        conn: &mut PgConnection,
        order: &Order,
        rider: &Rider,
        notes: Option<&str>,
    ) -> Result<OrderAssignment, AppError> {
        let assignment = self
            .rider_repo
            .create_assignment(&mut *conn, order.id, rider.id, notes)
            .await?;

        self.orders
            .apply_status(&mut *conn, order, OrderStatus::Assigned)
            .await?;

        self.notifier
            .enqueue(&mut *conn, notification_service::rider_assigned(order, rider))
            .await;

        tracing::info!("🛵 Pedido {} atribuído a {}", order.order_number, rider.name);
        Ok(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        order::RefundStatus,
        payment::PaymentMethod,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: "ORD-20250110-BBBBBB".into(),
            user_id: None,
            status,
            is_external: false,
            is_paid: false,
            payment_method: PaymentMethod::CashOnDelivery,
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: "CDF".into(),
            refund_status: RefundStatus::None,
            refund_requested: false,
            refund_reason: None,
            refund_requested_at: None,
            refund_expires_at: None,
            delivered_at: None,
            stock_deducted: false,
            customer_name: "Amani".into(),
            customer_email: None,
            customer_phone: "0990000000".into(),
            delivery_address: "Av. Kasa-Vubu 12".into(),
            delivery_city: "Kinshasa".into(),
            delivery_notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rider(active: Option<bool>) -> Rider {
        Rider {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            name: "Jo".into(),
            phone: "0991111111".into(),
            active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn only_pending_orders_take_a_first_rider() {
        assert!(ensure_assignable(&order(OrderStatus::Pending), &rider(None)).is_ok());
        assert!(matches!(
            ensure_assignable(&order(OrderStatus::Assigned), &rider(Some(true))),
            Err(AppError::OrderNotPending)
        ));
        assert!(matches!(
            ensure_assignable(&order(OrderStatus::Delivered), &rider(Some(true))),
            Err(AppError::OrderNotPending)
        ));
    }

    #[test]
    fn inactive_riders_are_refused() {
        assert!(matches!(
            ensure_assignable(&order(OrderStatus::Pending), &rider(Some(false))),
            Err(AppError::RiderInactive)
        ));
    }
}
