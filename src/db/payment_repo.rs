// src/db/payment_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::payment::{Payment, PaymentMethod, PaymentStatus},
};

#[derive(Clone, Default)]
pub struct PaymentRepository;

impl PaymentRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_payment<'e, E>(
        &self,
        executor: E,
        order_id: Option<Uuid>,
        reference: &str,
        method: PaymentMethod,
        amount: Decimal,
        currency: &str,
        phone: Option<&str>,
    ) -> Result<Payment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (order_id, reference, method, amount, currency, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(reference)
        .bind(method)
        .bind(amount)
        .bind(currency)
        .bind(phone)
        .fetch_one(executor)
        .await?;
        Ok(payment)
    }

    /// Último pagamento com a referência (a KPay pode reenviar a mesma).
    pub async fn find_by_reference<'e, E>(
        &self,
        executor: E,
        reference: &str,
    ) -> Result<Option<Payment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE reference = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(reference)
        .fetch_optional(executor)
        .await?;
        Ok(payment)
    }

    pub async fn find_by_reference_for_update<'e, E>(
        &self,
        executor: E,
        reference: &str,
    ) -> Result<Option<Payment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments WHERE reference = $1
            ORDER BY created_at DESC LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(reference)
        .fetch_optional(executor)
        .await?;
        Ok(payment)
    }

    pub async fn list_by_order<'e, E>(&self, executor: E, order_id: Uuid) -> Result<Vec<Payment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(executor)
        .await?;
        Ok(payments)
    }

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        payment_id: Uuid,
        status: PaymentStatus,
        failure_reason: Option<&str>,
    ) -> Result<Payment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $1,
                failure_reason = $2,
                completed_at = CASE WHEN $1 = 'completed'::payment_status THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(failure_reason)
        .bind(payment_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::PaymentNotFound)
    }

    /// Fecha os pagamentos COD pendentes de um pedido (entrega ou cancelamento).
    pub async fn settle_pending_cod<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        status: PaymentStatus,
        failure_reason: Option<&str>,
    ) -> Result<Vec<Payment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $1,
                failure_reason = $2,
                completed_at = CASE WHEN $1 = 'completed'::payment_status THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE order_id = $3 AND method = 'cash_on_delivery' AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(failure_reason)
        .bind(order_id)
        .fetch_all(executor)
        .await?;
        Ok(payments)
    }

    pub async fn link_to_order<'e, E>(
        &self,
        executor: E,
        payment_id: Uuid,
        order_id: Uuid,
    ) -> Result<Payment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET order_id = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(order_id)
        .bind(payment_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::PaymentNotFound)
    }
}
