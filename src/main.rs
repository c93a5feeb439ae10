//src/main.rs

use std::path::PathBuf;

use axum::{
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;
use crate::services::payment_poller::{reconcile_file, HttpKpayApi, PaymentPoller, PollConfig};

#[derive(Parser)]
#[command(name = "storefront-backend")]
#[command(about = "API da loja: pedidos, reembolsos, estoque e pagamentos")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Sobe a API (padrão)
    Serve,

    /// Retoma a confirmação de um pagamento KPay salvo pelo checkout
    Reconcile {
        /// Arquivo JSON com a sessão de checkout (referência + carrinho)
        session: PathBuf,

        /// URL base da API da loja
        #[arg(long, env = "STOREFRONT_URL", default_value = "http://127.0.0.1:3000")]
        base_url: String,

        /// Token do cliente, quando o pedido não é de convidado
        #[arg(long, env = "STOREFRONT_TOKEN")]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with_target(false)
        .compact()
        .init();

    dotenvy::dotenv().ok();
    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Reconcile { session, base_url, token } => reconcile(session, base_url, token).await,
    }
}

async fn reconcile(session: PathBuf, base_url: String, token: Option<String>) -> anyhow::Result<()> {
    let api = HttpKpayApi::new(reqwest::Client::new(), base_url, token);
    let poller = PaymentPoller::new(api, PollConfig::default());

    let outcome = reconcile_file(&poller, &session).await?;
    tracing::info!("Resultado da reconciliação: {:?}", outcome);
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    // Se a configuração falhar, a aplicação não deve iniciar.
    let config = Config::from_env()?;
    let app_state = AppState::new(config).await?;

    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Entrega das notificações em segundo plano
    let relay = app_state.outbox_relay()?;
    tokio::spawn(relay.run());

    let bind_addr = app_state.config.bind_addr.clone();
    let app = build_router(app_state)?;

    // Inicia o servidor
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Todas as rotas da API sobre o estado já montado.
fn build_router(app_state: AppState) -> anyhow::Result<Router> {
    // Checkout, KPay e a consulta de "pedidos ativos" aceitam convidados
    let public_routes = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .route("/payments/kpay/initiate", post(handlers::payments::initiate_payment))
        .route("/payments/kpay/status", post(handlers::payments::payment_status))
        .route("/payments/kpay/finalize", post(handlers::payments::finalize_payment))
        .route("/payments/kpay/webhook", post(handlers::payments::kpay_webhook))
        .route(
            "/admin/settings/orders-enabled",
            get(handlers::settings::get_orders_enabled).put(handlers::settings::update_orders_enabled),
        );

    // Clientes e entregadores (protegidas pelo middleware)
    let user_routes = Router::new()
        .route("/orders/mine", get(handlers::orders::list_my_orders))
        .route("/orders/{id}", get(handlers::orders::get_order))
        .route("/orders/{id}/assignment", get(handlers::riders::get_order_assignment))
        .route("/refunds/items/{item_id}", post(handlers::refunds::request_item_refund))
        .route("/refunds/items/{item_id}/cancel", post(handlers::refunds::cancel_item_refund))
        .route("/refunds/orders/{order_id}", post(handlers::refunds::request_order_refund))
        .route("/refunds/orders/{order_id}/cancel", post(handlers::refunds::cancel_order_refund))
        .route("/payments/order/{order_id}", get(handlers::payments::list_order_payments))
        .route("/payments/link", post(handlers::payments::link_payment))
        .route("/riders/me/assignments", get(handlers::riders::list_my_assignments))
        .route("/riders/assignments/{id}/respond", post(handlers::riders::respond_assignment))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Back-office: cada handler ainda exige RequireRole<AdminOnly>
    let admin_routes = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/{id}", delete(handlers::orders::delete_order))
        .route("/orders/{id}/status", patch(handlers::orders::update_order_status))
        .route("/orders/{id}/assign", post(handlers::riders::assign_rider))
        .route("/orders/{id}/reassign", post(handlers::riders::reassign_rider))
        .route("/refunds/items/{item_id}/respond", post(handlers::refunds::respond_item_refund))
        .route("/refunds/orders/{order_id}/respond", post(handlers::refunds::respond_order_refund))
        .route(
            "/riders",
            get(handlers::riders::list_riders).post(handlers::riders::create_rider),
        )
        .route("/riders/{id}/active", put(handlers::riders::set_rider_active))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    let cors = match app_state.config.cors_origin.as_deref() {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api", public_routes.merge(user_routes))
        .nest("/api/admin", admin_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sqlx::postgres::PgPoolOptions;

    fn test_config() -> Config {
        Config::from_lookup(|key: &str| match key {
            "DATABASE_URL" => Some("postgres://localhost/loja".to_string()),
            "JWT_SECRET" => Some("segredo".to_string()),
            "CORS_ORIGIN" => Some("http://localhost:5173".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn every_handler_mounts_on_the_router() {
        let config = test_config();
        let pool = PgPoolOptions::new().connect_lazy(&config.database_url).unwrap();
        let app_state = AppState::with_pool(config, pool, reqwest::Client::new());

        assert!(build_router(app_state).is_ok());
    }

    #[test]
    fn cli_defaults_to_serving_and_parses_reconcile() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from(["storefront-backend"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from([
            "storefront-backend",
            "reconcile",
            "checkout.json",
            "--base-url",
            "http://loja.local",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Reconcile { session, base_url, .. }) => {
                assert_eq!(session, PathBuf::from("checkout.json"));
                assert_eq!(base_url, "http://loja.local");
            }
            _ => panic!("esperava o subcomando reconcile"),
        }
    }
}
