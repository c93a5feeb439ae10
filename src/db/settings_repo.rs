// src/db/settings_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, Postgres};

use crate::{common::error::AppError, models::settings::SiteSettings};

#[derive(Clone, Default)]
pub struct SettingsRepository;

impl SettingsRepository {
    pub fn new() -> Self {
        Self
    }

    // Sem linha = configurações ainda não gravadas; o serviço usa o fallback do ambiente.
    pub async fn get_settings<'e, E>(&self, executor: E) -> Result<Option<SiteSettings>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let settings = sqlx::query_as::<_, SiteSettings>("SELECT * FROM site_settings WHERE id = 1")
            .fetch_optional(executor)
            .await?;
        Ok(settings)
    }

    pub async fn set_orders_enabled<'e, E>(
        &self,
        executor: E,
        enabled: bool,
        message: Option<&str>,
        initial_tax_rate: Decimal,
    ) -> Result<SiteSettings, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // UPSERT (Insert or Update); a alíquota só é usada quando a linha ainda não existe
        let settings = sqlx::query_as::<_, SiteSettings>(
            r#"
            INSERT INTO site_settings (id, orders_enabled, orders_disabled_message, tax_rate)
            VALUES (1, $1, $2, $3)
            ON CONFLICT (id)
            DO UPDATE SET
                orders_enabled = EXCLUDED.orders_enabled,
                orders_disabled_message = EXCLUDED.orders_disabled_message,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(enabled)
        .bind(message)
        .bind(initial_tax_rate)
        .fetch_one(executor)
        .await?;

        Ok(settings)
    }
}
