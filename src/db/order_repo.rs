// src/db/order_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        order::{Order, OrderItem, OrderStatus, OrderTotals, RefundStatus},
        payment::PaymentMethod,
    },
};

/// Dados de um pedido novo, já com os totais calculados.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub order_number: &'a str,
    pub user_id: Option<Uuid>,
    pub is_external: bool,
    pub is_paid: bool,
    pub payment_method: PaymentMethod,
    pub totals: OrderTotals,
    pub currency: &'a str,
    pub customer_name: &'a str,
    pub customer_email: Option<&'a str>,
    pub customer_phone: &'a str,
    pub delivery_address: &'a str,
    pub delivery_city: &'a str,
    pub delivery_notes: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem<'a> {
    pub product_id: Option<Uuid>,
    pub variation_id: Option<Uuid>,
    pub product_name: &'a str,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
}

/// Campos de reembolso gravados juntos (pedido ou item).
#[derive(Debug, Clone, PartialEq)]
pub struct RefundFields {
    pub status: RefundStatus,
    pub requested: bool,
    pub reason: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct OrderRepository;

impl OrderRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  PEDIDOS
    // =========================================================================

    pub async fn create_order<'e, E>(
        &self,
        executor: E,
        input: &NewOrder<'_>,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                order_number, user_id, is_external, is_paid, payment_method,
                subtotal, tax, total, currency,
                customer_name, customer_email, customer_phone,
                delivery_address, delivery_city, delivery_notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(input.order_number)
        .bind(input.user_id)
        .bind(input.is_external)
        .bind(input.is_paid)
        .bind(input.payment_method)
        .bind(input.totals.subtotal)
        .bind(input.totals.tax)
        .bind(input.totals.total)
        .bind(input.currency)
        .bind(input.customer_name)
        .bind(input.customer_email)
        .bind(input.customer_phone)
        .bind(input.delivery_address)
        .bind(input.delivery_city)
        .bind(input.delivery_notes)
        .fetch_one(executor)
        .await?;

        Ok(order)
    }

    pub async fn add_item<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        item: &NewOrderItem<'_>,
    ) -> Result<OrderItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (order_id, product_id, variation_id, product_name, quantity, price, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.variation_id)
        .bind(item.product_name)
        .bind(item.quantity)
        .bind(item.price)
        .bind(item.total)
        .fetch_one(executor)
        .await?;

        Ok(item)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, order_id: Uuid) -> Result<Option<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(executor)
            .await?;
        Ok(order)
    }

    /// Trava a linha do pedido até o fim da transação (read-modify-write dos totais).
    pub async fn find_by_id_for_update<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Option<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(executor)
            .await?;
        Ok(order)
    }

    pub async fn list_orders<'e, E>(
        &self,
        executor: E,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE ($1::order_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await?;
        Ok(orders)
    }

    pub async fn list_by_user<'e, E>(&self, executor: E, user_id: Uuid) -> Result<Vec<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;
        Ok(orders)
    }

    pub async fn update_totals<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        totals: OrderTotals,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE orders
            SET subtotal = $1, tax = $2, total = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(totals.subtotal)
        .bind(totals.tax)
        .bind(totals.total)
        .bind(order_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(status)
        .bind(order_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::OrderNotFound)
    }

    /// Marca entregue e registra que o estoque já foi baixado.
    pub async fn mark_delivered<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        delivered_at: DateTime<Utc>,
        is_paid: bool,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = 'delivered',
                delivered_at = COALESCE(delivered_at, $1),
                stock_deducted = TRUE,
                is_paid = is_paid OR $2,
                updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(delivered_at)
        .bind(is_paid)
        .bind(order_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::OrderNotFound)
    }

    pub async fn set_paid<'e, E>(&self, executor: E, order_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE orders SET is_paid = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn set_order_refund<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        fields: &RefundFields,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET refund_status = $1,
                refund_requested = $2,
                refund_reason = $3,
                refund_requested_at = $4,
                refund_expires_at = $5,
                updated_at = NOW()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(fields.status)
        .bind(fields.requested)
        .bind(fields.reason.as_deref())
        .bind(fields.requested_at)
        .bind(fields.expires_at)
        .bind(order_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::OrderNotFound)
    }

    /// Resposta do admin: só o status muda; o motivo fica para auditoria.
    pub async fn set_order_refund_status<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        status: RefundStatus,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET refund_status = $1, refund_requested = FALSE, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(order_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::OrderNotFound)
    }

    pub async fn delete_order<'e, E>(&self, executor: E, order_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    //  ITENS
    // =========================================================================

    pub async fn list_items<'e, E>(&self, executor: E, order_id: Uuid) -> Result<Vec<OrderItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(executor)
        .await?;
        Ok(items)
    }

    pub async fn find_item<'e, E>(&self, executor: E, item_id: Uuid) -> Result<Option<OrderItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(executor)
            .await?;
        Ok(item)
    }

    pub async fn set_item_refund<'e, E>(
        &self,
        executor: E,
        item_id: Uuid,
        fields: &RefundFields,
    ) -> Result<OrderItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, OrderItem>(
            r#"
            UPDATE order_items
            SET refund_status = $1,
                refund_requested = $2,
                refund_reason = $3,
                refund_requested_at = $4,
                refund_expires_at = $5
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(fields.status)
        .bind(fields.requested)
        .bind(fields.reason.as_deref())
        .bind(fields.requested_at)
        .bind(fields.expires_at)
        .bind(item_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::OrderItemNotFound)
    }

    pub async fn set_item_refund_status<'e, E>(
        &self,
        executor: E,
        item_id: Uuid,
        status: RefundStatus,
    ) -> Result<OrderItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, OrderItem>(
            r#"
            UPDATE order_items
            SET refund_status = $1, refund_requested = FALSE
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(item_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::OrderItemNotFound)
    }

    /// Aprovação em massa do pedido inteiro sobre os itens escolhidos pelo serviço.
    pub async fn set_items_refund_status<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        item_ids: &[Uuid],
        status: RefundStatus,
    ) -> Result<Vec<OrderItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            UPDATE order_items
            SET refund_status = $1, refund_requested = FALSE
            WHERE order_id = $2 AND id = ANY($3)
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(order_id)
        .bind(item_ids.to_vec())
        .fetch_all(executor)
        .await?;
        Ok(items)
    }
}
