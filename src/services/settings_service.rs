// src/services/settings_service.rs

use rust_decimal::Decimal;
use sqlx::{Acquire, Postgres};

use crate::{
    common::error::AppError,
    db::SettingsRepository,
    models::settings::{OrdersEnabledResponse, UpdateOrdersEnabledRequest},
};

pub const DEFAULT_DISABLED_MESSAGE: &str = "Os pedidos estão temporariamente desativados.";

/// O que o checkout precisa saber antes de gravar um pedido.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutPolicy {
    pub orders: OrdersEnabledResponse,
    pub tax_rate: Decimal,
}

impl CheckoutPolicy {
    pub fn ensure_open(&self) -> Result<(), AppError> {
        if self.orders.enabled {
            return Ok(());
        }
        Err(AppError::OrdersDisabled(
            self.orders
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_DISABLED_MESSAGE.to_string()),
        ))
    }
}

#[derive(Clone)]
pub struct SettingsService {
    settings_repo: SettingsRepository,
    env_orders_enabled: bool,
    default_tax_rate: Decimal,
}

impl SettingsService {
    pub fn new(settings_repo: SettingsRepository, env_orders_enabled: bool, default_tax_rate: Decimal) -> Self {
        Self {
            settings_repo,
            env_orders_enabled,
            default_tax_rate,
        }
    }

    pub async fn orders_enabled<'e, E>(&self, executor: E) -> Result<OrdersEnabledResponse, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let row = self.settings_repo.get_settings(&mut *tx).await?;
        tx.commit().await?;
        Ok(OrdersEnabledResponse::resolve(row.as_ref(), self.env_orders_enabled))
    }

    pub async fn set_orders_enabled<'e, E>(
        &self,
        executor: E,
        payload: &UpdateOrdersEnabledRequest,
    ) -> Result<OrdersEnabledResponse, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let row = self
            .settings_repo
            .set_orders_enabled(
                &mut *tx,
                payload.enabled,
                payload.message.as_deref(),
                self.default_tax_rate,
            )
            .await?;
        tx.commit().await?;

        tracing::info!("⚙️ Pedidos {}", if row.orders_enabled { "ativados" } else { "desativados" });
        Ok(OrdersEnabledResponse::resolve(Some(&row), self.env_orders_enabled))
    }

    pub async fn checkout_policy<'e, E>(&self, executor: E) -> Result<CheckoutPolicy, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let row = self.settings_repo.get_settings(&mut *tx).await?;
        tx.commit().await?;
        Ok(CheckoutPolicy {
            orders: OrdersEnabledResponse::resolve(row.as_ref(), self.env_orders_enabled),
            tax_rate: row.map(|r| r.tax_rate).unwrap_or(self.default_tax_rate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::SettingsSource;

    fn policy(enabled: bool, message: Option<&str>) -> CheckoutPolicy {
        CheckoutPolicy {
            orders: OrdersEnabledResponse {
                enabled,
                source: SettingsSource::Database,
                message: message.map(str::to_string),
            },
            tax_rate: Decimal::ZERO,
        }
    }

    #[test]
    fn closed_store_rejects_with_its_message() {
        let err = policy(false, Some("Inventário até segunda")).ensure_open().unwrap_err();
        assert!(matches!(err, AppError::OrdersDisabled(ref m) if m == "Inventário até segunda"));

        let err = policy(false, None).ensure_open().unwrap_err();
        assert!(matches!(err, AppError::OrdersDisabled(ref m) if m == DEFAULT_DISABLED_MESSAGE));

        assert!(policy(true, None).ensure_open().is_ok());
    }
}
