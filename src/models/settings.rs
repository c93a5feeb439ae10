// src/models/settings.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    #[schema(ignore)]
    pub id: i32,
    pub orders_enabled: bool,
    #[schema(example = "Voltamos amanhã às 8h.")]
    pub orders_disabled_message: Option<String>,
    #[schema(example = "0.1000")]
    pub tax_rate: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    Database,
    Environment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrdersEnabledResponse {
    pub enabled: bool,
    pub source: SettingsSource,
    pub message: Option<String>,
}

impl OrdersEnabledResponse {
    /// A linha do banco manda; sem ela, vale a variável de ambiente.
    pub fn resolve(row: Option<&SiteSettings>, env_default: bool) -> Self {
        match row {
            Some(settings) => Self {
                enabled: settings.orders_enabled,
                source: SettingsSource::Database,
                message: if settings.orders_enabled {
                    None
                } else {
                    settings.orders_disabled_message.clone()
                },
            },
            None => Self {
                enabled: env_default,
                source: SettingsSource::Environment,
                message: None,
            },
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrdersEnabledRequest {
    pub enabled: bool,
    #[schema(example = "Pedidos pausados para inventário.")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(enabled: bool) -> SiteSettings {
        SiteSettings {
            id: 1,
            orders_enabled: enabled,
            orders_disabled_message: Some("Fechado".into()),
            tax_rate: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn database_row_wins() {
        let resolved = OrdersEnabledResponse::resolve(Some(&row(false)), true);
        assert!(!resolved.enabled);
        assert_eq!(resolved.source, SettingsSource::Database);
        assert_eq!(resolved.message.as_deref(), Some("Fechado"));

        let resolved = OrdersEnabledResponse::resolve(Some(&row(true)), false);
        assert!(resolved.enabled);
        assert_eq!(resolved.message, None);
    }

    #[test]
    fn environment_is_the_fallback() {
        let resolved = OrdersEnabledResponse::resolve(None, true);
        assert!(resolved.enabled);
        assert_eq!(resolved.source, SettingsSource::Environment);
    }
}
