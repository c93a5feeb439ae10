// src/db/inventory_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::inventory::{StockMovement, StockMovementReason},
};

#[derive(Clone, Default)]
pub struct InventoryRepository;

/// Linha de estoque travada: saldo atual + flag de controle do produto.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct StockRow {
    pub stock: i32,
    pub track_quantity: bool,
}

impl InventoryRepository {
    pub fn new() -> Self {
        Self
    }

    // ---
    // Funções de "Leitura"
    // ---

    /// `track_quantity` do produto; `None` quando o produto não existe mais.
    pub async fn product_tracks_quantity<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Option<bool>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT track_quantity FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(executor)
                .await?;
        Ok(row.map(|(track,)| track))
    }

    pub async fn product_stock_for_update<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Option<StockRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, StockRow>(
            "SELECT stock, track_quantity FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    pub async fn variation_stock_for_update<'e, E>(
        &self,
        executor: E,
        variation_id: Uuid,
    ) -> Result<Option<i32>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT stock FROM product_variations WHERE id = $1 FOR UPDATE")
                .bind(variation_id)
                .fetch_optional(executor)
                .await?;
        Ok(row.map(|(stock,)| stock))
    }

    // ---
    // Funções de "Escrita"
    // ---

    pub async fn set_product_stock<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        stock: i32,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE products SET stock = $1, updated_at = NOW() WHERE id = $2")
            .bind(stock)
            .bind(product_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn set_variation_stock<'e, E>(
        &self,
        executor: E,
        variation_id: Uuid,
        stock: i32,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE product_variations SET stock = $1, updated_at = NOW() WHERE id = $2")
            .bind(stock)
            .bind(variation_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Registra uma movimentação no livro-razão (auditoria).
    pub async fn record_stock_movement<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        order_item_id: Uuid,
        product_id: Option<Uuid>,
        variation_id: Option<Uuid>,
        quantity_changed: i32,
        reason: StockMovementReason,
    ) -> Result<StockMovement, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let movement = sqlx::query_as::<_, StockMovement>(
            r#"
            INSERT INTO stock_movements (order_id, order_item_id, product_id, variation_id, quantity_changed, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(order_item_id)
        .bind(product_id)
        .bind(variation_id)
        .bind(quantity_changed)
        .bind(reason)
        .fetch_one(executor)
        .await?;

        Ok(movement)
    }
}
