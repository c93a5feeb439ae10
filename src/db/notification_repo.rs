// src/db/notification_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::notification::{NewNotification, NotificationPayload, OutboxEntry},
};

#[derive(Clone, Default)]
pub struct NotificationRepository;

impl NotificationRepository {
    pub fn new() -> Self {
        Self
    }

    /// Grava no outbox, a menos que a mesma chave já exista dentro da janela.
    /// Retorna `None` quando a notificação foi descartada como duplicada.
    pub async fn enqueue<'e, E>(
        &self,
        executor: E,
        notification: &NewNotification,
        dedupe_window_secs: i64,
    ) -> Result<Option<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO notification_outbox
                (recipient_user_id, recipient_role, kind, title, body, meta, dedupe_key)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE NOT EXISTS (
                SELECT 1 FROM notification_outbox
                WHERE dedupe_key = $7
                  AND created_at > NOW() - make_interval(secs => $8)
            )
            RETURNING id
            "#,
        )
        .bind(notification.recipient_user_id)
        .bind(notification.recipient_role.as_str())
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.meta)
        .bind(notification.dedupe_key())
        .bind(dedupe_window_secs as f64)
        .fetch_optional(executor)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Lote pendente, travado para que dois relays não entreguem a mesma linha.
    pub async fn claim_pending<'e, E>(
        &self,
        executor: E,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT * FROM notification_outbox
            WHERE delivered_at IS NULL AND attempts < $1
            ORDER BY created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(entries)
    }

    pub async fn mark_delivered<'e, E>(&self, executor: E, id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE notification_outbox SET delivered_at = NOW(), attempts = attempts + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn mark_failed<'e, E>(&self, executor: E, id: Uuid, error: &str) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE notification_outbox SET attempts = attempts + 1, last_error = $1 WHERE id = $2",
        )
        .bind(error)
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Entrega "server-side": insert direto na tabela lida pelos painéis.
    pub async fn insert_notification<'e, E>(
        &self,
        executor: E,
        payload: &NotificationPayload,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO notifications (recipient_user_id, recipient_role, type, title, body, meta)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payload.recipient_user_id)
        .bind(&payload.recipient_role)
        .bind(&payload.kind)
        .bind(&payload.title)
        .bind(&payload.body)
        .bind(&payload.meta)
        .execute(executor)
        .await?;
        Ok(())
    }
}
