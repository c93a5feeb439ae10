// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{
        InventoryRepository, NotificationRepository, OrderRepository, PaymentRepository,
        RiderRepository, SettingsRepository,
    },
    services::{
        auth::AuthService,
        inventory_service::InventoryService,
        kpay::{HttpKpayProvider, KpayProvider},
        notification_service::{DatabaseSink, HttpSink, NotificationService, NotificationSink, OutboxRelay},
        order_service::OrderService,
        payment_service::PaymentService,
        refund_service::RefundService,
        rider_service::RiderService,
        settings_service::SettingsService,
    },
};

/// Para onde o relay do outbox entrega as notificações.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Database,
    Http,
}

impl FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(SinkKind::Database),
            "http" => Ok(SinkKind::Http),
            other => Err(anyhow!("NOTIFICATION_SINK desconhecido: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub kpay_base_url: Option<String>,
    pub kpay_api_key: Option<String>,
    pub kpay_webhook_secret: Option<String>,
    pub notification_sink: SinkKind,
    pub notification_endpoint: Option<String>,
    pub notification_dedupe_secs: i64,
    pub outbox_poll_secs: u64,
    pub default_tax_rate: Decimal,
    pub orders_enabled: bool,
    pub cors_origin: Option<String>,
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("valor booleano inválido: {}", other)),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Monta a configuração a partir de qualquer fonte chave/valor.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Vazio conta como ausente
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).with_context(|| format!("{} deve ser definida", key));

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().context("DB_MAX_CONNECTIONS inválido")?,
            None => 5,
        };
        let notification_dedupe_secs = match get("NOTIFICATION_DEDUP_SECS") {
            Some(raw) => raw.parse().context("NOTIFICATION_DEDUP_SECS inválido")?,
            None => 60,
        };
        let outbox_poll_secs = match get("OUTBOX_POLL_SECS") {
            Some(raw) => raw.parse().context("OUTBOX_POLL_SECS inválido")?,
            None => 5,
        };
        let default_tax_rate = match get("DEFAULT_TAX_RATE") {
            Some(raw) => Decimal::from_str(raw.trim()).context("DEFAULT_TAX_RATE inválido")?,
            None => Decimal::ZERO,
        };
        let orders_enabled = match get("ORDERS_ENABLED") {
            Some(raw) => parse_flag(&raw).context("ORDERS_ENABLED inválido")?,
            None => true,
        };
        let notification_sink = match get("NOTIFICATION_SINK") {
            Some(raw) => raw.parse()?,
            None => SinkKind::Database,
        };
        let notification_endpoint = get("NOTIFICATION_ENDPOINT");
        if notification_sink == SinkKind::Http && notification_endpoint.is_none() {
            return Err(anyhow!("NOTIFICATION_ENDPOINT é obrigatório com NOTIFICATION_SINK=http"));
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            db_max_connections,
            kpay_base_url: get("KPAY_BASE_URL"),
            kpay_api_key: get("KPAY_API_KEY"),
            kpay_webhook_secret: get("KPAY_WEBHOOK_SECRET"),
            notification_sink,
            notification_endpoint,
            notification_dedupe_secs,
            outbox_poll_secs,
            default_tax_rate,
            orders_enabled,
            cors_origin: get("CORS_ORIGIN"),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub http_client: reqwest::Client,
    pub auth_service: AuthService,
    pub order_service: OrderService,
    pub refund_service: RefundService,
    pub payment_service: PaymentService,
    pub rider_service: RiderService,
    pub settings_service: SettingsService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self::with_pool(config, db_pool, http_client))
    }

    /// Monta o gráfico de dependências sobre um pool já criado.
    pub fn with_pool(config: Config, db_pool: PgPool, http_client: reqwest::Client) -> Self {
        // --- Monta o gráfico de dependências ---
        let order_repo = OrderRepository::new();
        let payment_repo = PaymentRepository::new();

        let notifier = NotificationService::new(NotificationRepository::new(), config.notification_dedupe_secs);
        let inventory = InventoryService::new(InventoryRepository::new());
        let settings_service = SettingsService::new(
            SettingsRepository::new(),
            config.orders_enabled,
            config.default_tax_rate,
        );

        let provider: Option<Arc<dyn KpayProvider>> = match (&config.kpay_base_url, &config.kpay_api_key) {
            (Some(base_url), Some(api_key)) => Some(Arc::new(HttpKpayProvider::new(
                http_client.clone(),
                base_url.clone(),
                api_key.clone(),
            ))),
            _ => {
                tracing::warn!("KPay não configurada: cobranças móveis desativadas");
                None
            }
        };
        if config.kpay_webhook_secret.is_none() {
            tracing::warn!("KPAY_WEBHOOK_SECRET ausente: todos os webhooks serão recusados");
        }

        let payment_service = PaymentService::new(
            payment_repo.clone(),
            order_repo.clone(),
            notifier.clone(),
            provider,
            config.kpay_webhook_secret.clone(),
        );
        let order_service = OrderService::new(
            order_repo.clone(),
            payment_repo,
            inventory.clone(),
            payment_service.clone(),
            notifier.clone(),
            settings_service.clone(),
        );
        let refund_service = RefundService::new(
            order_repo.clone(),
            order_service.clone(),
            inventory,
            notifier.clone(),
        );
        let rider_service = RiderService::new(
            RiderRepository::new(),
            order_repo,
            order_service.clone(),
            notifier,
        );
        let auth_service = AuthService::new(config.jwt_secret.clone());

        Self {
            db_pool,
            config: Arc::new(config),
            http_client,
            auth_service,
            order_service,
            refund_service,
            payment_service,
            rider_service,
            settings_service,
        }
    }

    /// Relay do outbox com o destino escolhido na configuração.
    pub fn outbox_relay(&self) -> anyhow::Result<OutboxRelay> {
        let sink: Arc<dyn NotificationSink> = match self.config.notification_sink {
            SinkKind::Database => Arc::new(DatabaseSink::new(self.db_pool.clone())),
            SinkKind::Http => {
                let endpoint = self
                    .config
                    .notification_endpoint
                    .clone()
                    .context("NOTIFICATION_ENDPOINT ausente")?;
                Arc::new(HttpSink::new(self.http_client.clone(), endpoint))
            }
        };

        Ok(OutboxRelay::new(
            self.db_pool.clone(),
            sink,
            Duration::from_secs(self.config.outbox_poll_secs.max(1)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 2] = [("DATABASE_URL", "postgres://localhost/loja"), ("JWT_SECRET", "segredo")];

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let config = Config::from_lookup(lookup(&BASE)).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.notification_sink, SinkKind::Database);
        assert_eq!(config.notification_dedupe_secs, 60);
        assert_eq!(config.outbox_poll_secs, 5);
        assert_eq!(config.default_tax_rate, Decimal::ZERO);
        assert!(config.orders_enabled);
        assert!(config.kpay_base_url.is_none());
    }

    #[test]
    fn required_vars_are_enforced() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "x")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "x"), ("JWT_SECRET", "  ")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn parses_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("DEFAULT_TAX_RATE", "0.16"),
            ("ORDERS_ENABLED", "false"),
            ("NOTIFICATION_SINK", "http"),
            ("NOTIFICATION_ENDPOINT", "http://localhost:8080/internal/notifications"),
            ("DB_MAX_CONNECTIONS", "12"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.default_tax_rate, Decimal::new(16, 2));
        assert!(!config.orders_enabled);
        assert_eq!(config.notification_sink, SinkKind::Http);
        assert_eq!(config.db_max_connections, 12);
    }

    #[test]
    fn http_sink_needs_an_endpoint() {
        let mut pairs = BASE.to_vec();
        pairs.push(("NOTIFICATION_SINK", "http"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = BASE.to_vec();
        pairs.push(("NOTIFICATION_SINK", "pombo"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
