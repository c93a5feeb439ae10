// src/db/rider_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::rider::{AssignmentStatus, OrderAssignment, Rider},
};

#[derive(Clone, Default)]
pub struct RiderRepository;

impl RiderRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  ENTREGADORES
    // =========================================================================

    pub async fn create_rider<'e, E>(
        &self,
        executor: E,
        name: &str,
        phone: &str,
        user_id: Option<Uuid>,
    ) -> Result<Rider, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rider = sqlx::query_as::<_, Rider>(
            "INSERT INTO riders (name, phone, user_id, active) VALUES ($1, $2, $3, TRUE) RETURNING *",
        )
        .bind(name)
        .bind(phone)
        .bind(user_id)
        .fetch_one(executor)
        .await?;
        Ok(rider)
    }

    pub async fn list_riders<'e, E>(&self, executor: E) -> Result<Vec<Rider>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let riders = sqlx::query_as::<_, Rider>("SELECT * FROM riders ORDER BY name ASC")
            .fetch_all(executor)
            .await?;
        Ok(riders)
    }

    pub async fn find_rider<'e, E>(&self, executor: E, rider_id: Uuid) -> Result<Option<Rider>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rider = sqlx::query_as::<_, Rider>("SELECT * FROM riders WHERE id = $1")
            .bind(rider_id)
            .fetch_optional(executor)
            .await?;
        Ok(rider)
    }

    pub async fn find_rider_by_user<'e, E>(&self, executor: E, user_id: Uuid) -> Result<Option<Rider>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rider = sqlx::query_as::<_, Rider>("SELECT * FROM riders WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
        Ok(rider)
    }

    pub async fn set_active<'e, E>(&self, executor: E, rider_id: Uuid, active: bool) -> Result<Rider, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Rider>("UPDATE riders SET active = $1 WHERE id = $2 RETURNING *")
            .bind(active)
            .bind(rider_id)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::RiderNotFound)
    }

    // =========================================================================
    //  ATRIBUIÇÕES
    // =========================================================================

    pub async fn create_assignment<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        rider_id: Uuid,
        notes: Option<&str>,
    ) -> Result<OrderAssignment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignment = sqlx::query_as::<_, OrderAssignment>(
            r#"
            INSERT INTO order_assignments (order_id, rider_id, notes)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(rider_id)
        .bind(notes)
        .fetch_one(executor)
        .await?;
        Ok(assignment)
    }

    pub async fn latest_for_order<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Option<OrderAssignment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignment = sqlx::query_as::<_, OrderAssignment>(
            r#"
            SELECT * FROM order_assignments
            WHERE order_id = $1
            ORDER BY assigned_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(executor)
        .await?;
        Ok(assignment)
    }

    /// Aposenta toda atribuição ainda ativa do pedido (nada é apagado).
    pub async fn retire_active<'e, E>(&self, executor: E, order_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE order_assignments
            SET status = 'reassigned', responded_at = NOW()
            WHERE order_id = $1 AND status IN ('pending', 'accepted')
            "#,
        )
        .bind(order_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_assignment<'e, E>(
        &self,
        executor: E,
        assignment_id: Uuid,
    ) -> Result<Option<OrderAssignment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignment = sqlx::query_as::<_, OrderAssignment>(
            "SELECT * FROM order_assignments WHERE id = $1",
        )
        .bind(assignment_id)
        .fetch_optional(executor)
        .await?;
        Ok(assignment)
    }

    pub async fn find_assignment_for_update<'e, E>(
        &self,
        executor: E,
        assignment_id: Uuid,
    ) -> Result<Option<OrderAssignment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignment = sqlx::query_as::<_, OrderAssignment>(
            "SELECT * FROM order_assignments WHERE id = $1 FOR UPDATE",
        )
        .bind(assignment_id)
        .fetch_optional(executor)
        .await?;
        Ok(assignment)
    }

    pub async fn update_assignment_status<'e, E>(
        &self,
        executor: E,
        assignment_id: Uuid,
        status: AssignmentStatus,
        notes: Option<&str>,
    ) -> Result<OrderAssignment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, OrderAssignment>(
            r#"
            UPDATE order_assignments
            SET status = $1, notes = COALESCE($2, notes), responded_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(notes)
        .bind(assignment_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::AssignmentNotFound)
    }

    /// Entregador da atribuição ativa mais recente do pedido.
    pub async fn active_rider_for_order<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Option<Rider>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rider = sqlx::query_as::<_, Rider>(
            r#"
            SELECT r.* FROM order_assignments a
            JOIN riders r ON r.id = a.rider_id
            WHERE a.order_id = $1 AND a.status IN ('pending', 'accepted')
            ORDER BY a.assigned_at DESC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(executor)
        .await?;
        Ok(rider)
    }

    pub async fn list_for_rider<'e, E>(
        &self,
        executor: E,
        rider_id: Uuid,
    ) -> Result<Vec<OrderAssignment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignments = sqlx::query_as::<_, OrderAssignment>(
            "SELECT * FROM order_assignments WHERE rider_id = $1 ORDER BY assigned_at DESC",
        )
        .bind(rider_id)
        .fetch_all(executor)
        .await?;
        Ok(assignments)
    }
}
