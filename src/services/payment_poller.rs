// src/services/payment_poller.rs

//! Reconciliação do lado do cliente para pagamentos KPay.
//!
//! O checkout guarda a referência do pagamento e um snapshot do carrinho antes de
//! mandar o cliente para o provedor. Na volta, o poller consulta o status até 6 vezes
//! (espera de `500ms × tentativa`). Se o tempo acabar, a referência continua guardada
//! para que um webhook posterior ainda resolva o pedido.

use std::{path::Path, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        order::CreateOrderRequest,
        payment::{
            FinalizeResponse, LinkPaymentRequest, Payment, PaymentMethod, PaymentReferenceRequest,
            PaymentStatus, PaymentStatusResponse, payments_authorize,
        },
    },
};

/// Endpoints de pagamento que o checkout consome.
#[async_trait]
pub trait KpayApi: Send + Sync {
    async fn status(&self, reference: &str) -> Result<PaymentStatusResponse, AppError>;
    async fn finalize(&self, reference: &str) -> Result<FinalizeResponse, AppError>;
    async fn order_payments(&self, order_id: Uuid) -> Result<Vec<Payment>, AppError>;
    async fn create_order(&self, order: &CreateOrderRequest) -> Result<Uuid, AppError>;
    async fn link_payment(&self, request: &LinkPaymentRequest) -> Result<Payment, AppError>;
}

pub struct HttpKpayApi {
    client: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl HttpKpayApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl KpayApi for HttpKpayApi {
    async fn status(&self, reference: &str) -> Result<PaymentStatusResponse, AppError> {
        let body = PaymentReferenceRequest { reference: reference.to_string() };
        Ok(self
            .post("/api/payments/kpay/status")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn finalize(&self, reference: &str) -> Result<FinalizeResponse, AppError> {
        let body = PaymentReferenceRequest { reference: reference.to_string() };
        Ok(self
            .post("/api/payments/kpay/finalize")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn order_payments(&self, order_id: Uuid) -> Result<Vec<Payment>, AppError> {
        Ok(self
            .get(&format!("/api/payments/order/{}", order_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn create_order(&self, order: &CreateOrderRequest) -> Result<Uuid, AppError> {
        let detail: CreatedOrder = self
            .post("/api/orders")
            .json(order)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(detail.id)
    }

    async fn link_payment(&self, request: &LinkPaymentRequest) -> Result<Payment, AppError> {
        Ok(self
            .post("/api/payments/link")
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

/// Só o id interessa na resposta de criação (`OrderDetail` achatado).
#[derive(Deserialize)]
struct CreatedOrder {
    id: Uuid,
}

// ---
// Sessão de checkout
// ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSnapshot {
    pub order: CreateOrderRequest,
    pub saved_at: DateTime<Utc>,
}

/// Estado que sobrevive ao redirecionamento para o provedor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub pending_reference: Option<String>,
    pub snapshot: Option<CheckoutSnapshot>,
}

impl CheckoutSession {
    pub fn start(reference: String, order: CreateOrderRequest) -> Self {
        Self {
            pending_reference: Some(reference),
            snapshot: Some(CheckoutSnapshot { order, saved_at: Utc::now() }),
        }
    }

    fn clear(&mut self) {
        self.pending_reference = None;
        self.snapshot = None;
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl PollConfig {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// O pedido já existia e tem pagamento concluído.
    Confirmed { order_id: Uuid },
    /// Pagamento confirmado sem pedido: o pedido foi criado a partir do snapshot.
    Created { order_id: Uuid },
    /// Tentativas esgotadas; a referência continua na sessão.
    TimedOut { reference: String },
    Failed { reason: String },
}

enum Step {
    Done(PollOutcome),
    Retry,
}

pub struct PaymentPoller<A> {
    api: A,
    config: PollConfig,
}

impl<A: KpayApi> PaymentPoller<A> {
    pub fn new(api: A, config: PollConfig) -> Self {
        Self { api, config }
    }

    pub async fn reconcile(&self, session: &mut CheckoutSession) -> PollOutcome {
        let Some(reference) = session.pending_reference.clone() else {
            return PollOutcome::Failed {
                reason: "Nenhum pagamento pendente.".to_string(),
            };
        };

        for attempt in 1..=self.config.max_attempts {
            match self.step(&reference, session).await {
                Ok(Step::Done(outcome)) => {
                    session.clear();
                    return outcome;
                }
                Ok(Step::Retry) => {}
                Err(e) => tracing::warn!("Consulta do pagamento {} falhou (tentativa {}): {}", reference, attempt, e),
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.delay_after(attempt)).await;
            }
        }

        tracing::warn!("Pagamento {} sem confirmação; referência mantida", reference);
        PollOutcome::TimedOut { reference }
    }

    async fn step(&self, reference: &str, session: &CheckoutSession) -> Result<Step, AppError> {
        let status = self.api.status(reference).await?;

        // Pedido já criado (webhook): confere os pagamentos do pedido, não o payload.
        if let Some(order_id) = status.order_id {
            return Ok(if self.order_is_paid(order_id).await? {
                Step::Done(PollOutcome::Confirmed { order_id })
            } else {
                Step::Retry
            });
        }

        match status.status {
            PaymentStatus::Pending => Ok(Step::Retry),
            PaymentStatus::Failed | PaymentStatus::Cancelled => Ok(Step::Done(PollOutcome::Failed {
                reason: format!("Pagamento {:?}", status.status).to_lowercase(),
            })),
            PaymentStatus::Completed => self.finalize(reference, session).await,
        }
    }

    async fn finalize(&self, reference: &str, session: &CheckoutSession) -> Result<Step, AppError> {
        let finalized = self.api.finalize(reference).await?;

        if let Some(order_id) = finalized.order_id {
            return Ok(if self.order_is_paid(order_id).await? {
                Step::Done(PollOutcome::Confirmed { order_id })
            } else {
                Step::Retry
            });
        }

        if !(finalized.success && finalized.can_create_order) {
            return Ok(Step::Retry);
        }

        let Some(snapshot) = &session.snapshot else {
            return Ok(Step::Done(PollOutcome::Failed {
                reason: "Pagamento confirmado, mas o carrinho salvo não existe mais.".to_string(),
            }));
        };

        let mut order = snapshot.order.clone();
        order.payment_method = PaymentMethod::Kpay;
        order.payment_reference = Some(reference.to_string());

        let order_id = self.api.create_order(&order).await?;

        // A criação já vincula a referência; o link explícito cobre servidores antigos.
        let link = LinkPaymentRequest {
            order_id,
            reference: reference.to_string(),
        };
        if let Err(e) = self.api.link_payment(&link).await {
            tracing::warn!("Falha ao vincular {} ao pedido {}: {}", reference, order_id, e);
        }

        Ok(Step::Done(PollOutcome::Created { order_id }))
    }

    async fn order_is_paid(&self, order_id: Uuid) -> Result<bool, AppError> {
        let payments = self.api.order_payments(order_id).await?;
        Ok(payments_authorize(&payments))
    }
}

// ---
// Sessão salva em arquivo (comando `reconcile`)
// ---

/// Retoma uma sessão salva pelo checkout e grava o estado final de volta no arquivo.
pub async fn reconcile_file<A: KpayApi>(
    poller: &PaymentPoller<A>,
    path: &Path,
) -> anyhow::Result<PollOutcome> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("não foi possível ler {}", path.display()))?;
    let mut session: CheckoutSession =
        serde_json::from_str(&raw).context("sessão de checkout inválida")?;

    let outcome = poller.reconcile(&mut session).await;

    tokio::fs::write(path, serde_json::to_vec_pretty(&session)?)
        .await
        .with_context(|| format!("não foi possível gravar {}", path.display()))?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use rust_decimal::Decimal;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    #[derive(Default)]
    struct ScriptedApi {
        statuses: Mutex<VecDeque<PaymentStatusResponse>>,
        finalize: Mutex<Option<FinalizeResponse>>,
        payments: Mutex<Vec<Payment>>,
        created: Mutex<Vec<CreateOrderRequest>>,
        linked: Mutex<Vec<LinkPaymentRequest>>,
        new_order_id: Uuid,
        status_calls: Mutex<u32>,
    }

    #[async_trait]
    impl KpayApi for ScriptedApi {
        async fn status(&self, _reference: &str) -> Result<PaymentStatusResponse, AppError> {
            *self.status_calls.lock().unwrap() += 1;
            let mut statuses = self.statuses.lock().unwrap();
            let next = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            };
            next.ok_or(AppError::PaymentNotFound)
        }

        async fn finalize(&self, _reference: &str) -> Result<FinalizeResponse, AppError> {
            self.finalize.lock().unwrap().clone().ok_or(AppError::PaymentNotFound)
        }

        async fn order_payments(&self, _order_id: Uuid) -> Result<Vec<Payment>, AppError> {
            Ok(self.payments.lock().unwrap().clone())
        }

        async fn create_order(&self, order: &CreateOrderRequest) -> Result<Uuid, AppError> {
            self.created.lock().unwrap().push(order.clone());
            Ok(self.new_order_id)
        }

        async fn link_payment(&self, request: &LinkPaymentRequest) -> Result<Payment, AppError> {
            self.linked.lock().unwrap().push(request.clone());
            Ok(payment(PaymentStatus::Completed, Some(request.order_id)))
        }
    }

    fn payment(status: PaymentStatus, order_id: Option<Uuid>) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            order_id,
            reference: "KP-ABC".into(),
            method: PaymentMethod::Kpay,
            amount: Decimal::from(330),
            currency: "CDF".into(),
            phone: Some("0990000000".into()),
            status,
            failure_reason: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn status(order_id: Option<Uuid>, status: PaymentStatus) -> PaymentStatusResponse {
        PaymentStatusResponse { order_id, status }
    }

    fn cart() -> CreateOrderRequest {
        serde_json::from_value(serde_json::json!({
            "customerName": "Amani",
            "customerPhone": "0990000000",
            "deliveryAddress": "Av. Kasa-Vubu 12",
            "deliveryCity": "Kinshasa",
            "paymentMethod": "kpay",
            "items": [{ "productName": "Camiseta", "quantity": 2, "price": 50.0 }]
        }))
        .unwrap()
    }

    fn fast() -> PollConfig {
        PollConfig {
            max_attempts: 6,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn default_schedule_waits_500ms_times_attempt() {
        let config = PollConfig::default();
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.delay_after(1), Duration::from_millis(500));
        assert_eq!(config.delay_after(3), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn completed_without_order_creates_it_from_the_snapshot() {
        let new_order_id = Uuid::new_v4();
        let api = ScriptedApi {
            new_order_id,
            ..Default::default()
        };
        api.statuses
            .lock()
            .unwrap()
            .push_back(status(None, PaymentStatus::Completed));
        *api.finalize.lock().unwrap() = Some(FinalizeResponse {
            success: true,
            order_id: None,
            can_create_order: true,
            message: None,
        });

        let mut session = CheckoutSession::start("KP-ABC".into(), cart());
        let poller = PaymentPoller::new(api, fast());

        let outcome = poller.reconcile(&mut session).await;

        assert_eq!(outcome, PollOutcome::Created { order_id: new_order_id });
        let created = poller.api.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].payment_reference.as_deref(), Some("KP-ABC"));
        assert_eq!(created[0].payment_method, PaymentMethod::Kpay);
        let linked = poller.api.linked.lock().unwrap();
        assert_eq!(linked[0].order_id, new_order_id);
        assert_eq!(linked[0].reference, "KP-ABC");
        assert!(session.pending_reference.is_none());
    }

    #[tokio::test]
    async fn order_id_in_poll_is_checked_against_real_payments() {
        let order_id = Uuid::new_v4();
        let api = ScriptedApi::default();
        {
            let mut statuses = api.statuses.lock().unwrap();
            statuses.push_back(status(Some(order_id), PaymentStatus::Completed));
            statuses.push_back(status(Some(order_id), PaymentStatus::Completed));
        }
        // Primeiro só existe um pagamento pendente: o payload não basta.
        api.payments
            .lock()
            .unwrap()
            .push(payment(PaymentStatus::Pending, Some(order_id)));

        let poller = PaymentPoller::new(api, PollConfig { max_attempts: 2, ..fast() });
        let mut session = CheckoutSession::start("KP-ABC".into(), cart());

        let outcome = poller.reconcile(&mut session).await;
        assert_eq!(outcome, PollOutcome::TimedOut { reference: "KP-ABC".into() });

        poller
            .api
            .payments
            .lock()
            .unwrap()
            .push(payment(PaymentStatus::Completed, Some(order_id)));
        let outcome = poller.reconcile(&mut session).await;
        assert_eq!(outcome, PollOutcome::Confirmed { order_id });
    }

    #[tokio::test]
    async fn timeout_keeps_the_reference() {
        let api = ScriptedApi::default();
        api.statuses
            .lock()
            .unwrap()
            .push_back(status(None, PaymentStatus::Pending));

        let poller = PaymentPoller::new(api, fast());
        let mut session = CheckoutSession::start("KP-ABC".into(), cart());

        let outcome = poller.reconcile(&mut session).await;

        assert_eq!(outcome, PollOutcome::TimedOut { reference: "KP-ABC".into() });
        assert_eq!(*poller.api.status_calls.lock().unwrap(), 6);
        assert_eq!(session.pending_reference.as_deref(), Some("KP-ABC"));
        assert!(session.snapshot.is_some());
    }

    #[tokio::test]
    async fn provider_failure_ends_the_session() {
        let api = ScriptedApi::default();
        api.statuses
            .lock()
            .unwrap()
            .push_back(status(None, PaymentStatus::Failed));

        let poller = PaymentPoller::new(api, fast());
        let mut session = CheckoutSession::start("KP-ABC".into(), cart());

        let outcome = poller.reconcile(&mut session).await;

        assert!(matches!(outcome, PollOutcome::Failed { .. }));
        assert!(session.pending_reference.is_none());
        assert!(poller.api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_snapshot_does_not_create_anything() {
        let api = ScriptedApi::default();
        api.statuses
            .lock()
            .unwrap()
            .push_back(status(None, PaymentStatus::Completed));
        *api.finalize.lock().unwrap() = Some(FinalizeResponse {
            success: true,
            order_id: None,
            can_create_order: true,
            message: None,
        });

        let poller = PaymentPoller::new(api, fast());
        let mut session = CheckoutSession {
            pending_reference: Some("KP-ABC".into()),
            snapshot: None,
        };

        let outcome = poller.reconcile(&mut session).await;

        assert!(matches!(outcome, PollOutcome::Failed { .. }));
        assert!(poller.api.created.lock().unwrap().is_empty());
    }

    // --- Cliente HTTP contra um servidor local ---

    async fn spawn_storefront(new_order_id: Uuid, created: Arc<Mutex<Vec<CreateOrderRequest>>>) -> String {
        let app = Router::new()
            .route(
                "/api/payments/kpay/status",
                post(|Json(_): Json<PaymentReferenceRequest>| async {
                    Json(status(None, PaymentStatus::Completed))
                }),
            )
            .route(
                "/api/payments/kpay/finalize",
                post(|| async {
                    Json(FinalizeResponse {
                        success: true,
                        order_id: None,
                        can_create_order: true,
                        message: None,
                    })
                }),
            )
            .route(
                "/api/orders",
                post(move |Json(order): Json<CreateOrderRequest>| async move {
                    created.lock().unwrap().push(order);
                    Json(serde_json::json!({ "id": new_order_id, "items": [] }))
                }),
            )
            .route(
                "/api/payments/link",
                post(|Json(request): Json<LinkPaymentRequest>| async move {
                    Json(payment(PaymentStatus::Completed, Some(request.order_id)))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn http_client_reconciles_a_saved_session() {
        let new_order_id = Uuid::new_v4();
        let created = Arc::new(Mutex::new(Vec::new()));
        let base_url = spawn_storefront(new_order_id, created.clone()).await;

        let path = std::env::temp_dir().join(format!("checkout-{}.json", Uuid::new_v4()));
        let session = CheckoutSession::start("KP-ABC".into(), cart());
        std::fs::write(&path, serde_json::to_vec(&session).unwrap()).unwrap();

        let api = HttpKpayApi::new(reqwest::Client::new(), base_url, Some("token".into()));
        let poller = PaymentPoller::new(api, fast());

        let outcome = reconcile_file(&poller, &path).await.unwrap();

        assert_eq!(outcome, PollOutcome::Created { order_id: new_order_id });
        assert_eq!(created.lock().unwrap()[0].payment_reference.as_deref(), Some("KP-ABC"));

        let saved: CheckoutSession =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(saved.pending_reference.is_none());
        assert!(saved.snapshot.is_none());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn unreadable_session_file_is_an_error() {
        let poller = PaymentPoller::new(ScriptedApi::default(), fast());
        let path = std::env::temp_dir().join(format!("ausente-{}.json", Uuid::new_v4()));

        assert!(reconcile_file(&poller, &path).await.is_err());
    }
}
