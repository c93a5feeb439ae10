// src/services/notification_service.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use sqlx::{Acquire, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::NotificationRepository,
    models::{
        notification::{
            NewNotification, NotificationKind, NotificationPayload, OutboxEntry, RecipientRole,
        },
        order::{Order, OrderItem, OrderStatus},
        rider::Rider,
    },
};

/// Quantas vezes o relay tenta entregar antes de desistir da linha.
pub const MAX_DELIVERY_ATTEMPTS: i32 = 10;
const RELAY_BATCH_SIZE: i64 = 50;

// =============================================================================
//  OUTBOX (escrita junto com a mudança de estado)
// =============================================================================

#[derive(Clone)]
pub struct NotificationService {
    repo: NotificationRepository,
    dedupe_window_secs: i64,
}

impl NotificationService {
    pub fn new(repo: NotificationRepository, dedupe_window_secs: i64) -> Self {
        Self { repo, dedupe_window_secs }
    }

    /// Grava a notificação na mesma transação da mudança de estado.
    /// Roda num savepoint: se falhar, a operação principal segue normalmente.
    pub async fn enqueue(&self, conn: &mut PgConnection, notification: NewNotification) {
        let result: Result<Option<Uuid>, AppError> = async {
            let mut sp = conn.begin().await?;
            let id = self
                .repo
                .enqueue(&mut *sp, &notification, self.dedupe_window_secs)
                .await?;
            sp.commit().await?;
            Ok(id)
        }
        .await;

        match result {
            Ok(Some(_)) => {}
            Ok(None) => tracing::debug!(
                "Notificação {} descartada (duplicada na janela)",
                notification.dedupe_key()
            ),
            Err(e) => tracing::warn!(
                "Falha ao gravar notificação {} no outbox: {}",
                notification.kind.as_str(),
                e
            ),
        }
    }
}

// ---
// Construtores das mensagens
// ---

pub fn order_created(order: &Order) -> NewNotification {
    NewNotification {
        recipient_user_id: None,
        recipient_role: RecipientRole::Admin,
        kind: NotificationKind::OrderCreated,
        title: format!("Novo pedido {}", order.order_number),
        body: format!(
            "{} ({}) fez um pedido de {} {}.",
            order.customer_name, order.delivery_city, order.total, order.currency
        ),
        meta: json!({ "orderId": order.id, "orderNumber": order.order_number }),
        subject_id: order.id,
        transition: None,
    }
}

/// Aviso ao admin com cliente, cidade, produto e motivo.
pub fn refund_requested(order: &Order, item: Option<&OrderItem>, reason: &str) -> NewNotification {
    let product = item
        .map(|i| i.product_name.clone())
        .unwrap_or_else(|| "Pedido inteiro".to_string());
    NewNotification {
        recipient_user_id: None,
        recipient_role: RecipientRole::Admin,
        kind: NotificationKind::RefundRequested,
        title: format!("Reembolso solicitado - {}", order.order_number),
        body: format!(
            "Cliente: {} | Cidade: {} | Produto: {} | Motivo: {}",
            order.customer_name, order.delivery_city, product, reason
        ),
        meta: json!({
            "orderId": order.id,
            "orderNumber": order.order_number,
            "itemId": item.map(|i| i.id),
        }),
        subject_id: item.map(|i| i.id).unwrap_or(order.id),
        transition: None,
    }
}

/// Resposta do admin ao cliente dono do pedido.
pub fn refund_answered(
    order: &Order,
    item: Option<&OrderItem>,
    approved: bool,
) -> Option<NewNotification> {
    let user_id = order.user_id?;
    let (kind, title) = if approved {
        (NotificationKind::RefundApproved, "Reembolso aprovado")
    } else {
        (NotificationKind::RefundRejected, "Pedido de reembolso rejeitado")
    };
    let target = item
        .map(|i| i.product_name.clone())
        .unwrap_or_else(|| format!("pedido {}", order.order_number));
    Some(NewNotification {
        recipient_user_id: Some(user_id),
        recipient_role: RecipientRole::Customer,
        kind,
        title: title.to_string(),
        body: format!("{}: {}", title, target),
        meta: json!({ "orderId": order.id, "itemId": item.map(|i| i.id) }),
        subject_id: item.map(|i| i.id).unwrap_or(order.id),
        transition: None,
    })
}

pub fn order_status_changed(order: &Order, status: OrderStatus) -> Option<NewNotification> {
    let user_id = order.user_id?;
    let status_label = serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    Some(NewNotification {
        recipient_user_id: Some(user_id),
        recipient_role: RecipientRole::Customer,
        kind: NotificationKind::OrderStatusChanged,
        title: format!("Pedido {} atualizado", order.order_number),
        body: format!("Seu pedido agora está: {}", status_label),
        meta: json!({ "orderId": order.id, "status": status_label }),
        subject_id: order.id,
        transition: Some(status_label),
    })
}

pub fn rider_assigned(order: &Order, rider: &Rider) -> NewNotification {
    NewNotification {
        recipient_user_id: rider.user_id,
        recipient_role: RecipientRole::Rider,
        kind: NotificationKind::RiderAssigned,
        title: format!("Nova entrega {}", order.order_number),
        body: format!("{} - {}", order.delivery_address, order.delivery_city),
        meta: json!({ "orderId": order.id, "riderId": rider.id }),
        subject_id: order.id,
        transition: Some(rider.id.to_string()),
    }
}

pub fn rider_rejected(order: &Order, rider: &Rider) -> NewNotification {
    NewNotification {
        recipient_user_id: None,
        recipient_role: RecipientRole::Admin,
        kind: NotificationKind::AssignmentRejected,
        title: format!("Entrega recusada - {}", order.order_number),
        body: format!("{} recusou a entrega. O pedido voltou para a fila.", rider.name),
        meta: json!({ "orderId": order.id, "riderId": rider.id }),
        subject_id: order.id,
        transition: Some(rider.id.to_string()),
    }
}

pub fn payment_completed(order_id: Uuid, reference: &str) -> NewNotification {
    NewNotification {
        recipient_user_id: None,
        recipient_role: RecipientRole::Admin,
        kind: NotificationKind::PaymentCompleted,
        title: "Pagamento KPay confirmado".to_string(),
        body: format!("Referência {}", reference),
        meta: json!({ "orderId": order_id, "reference": reference }),
        subject_id: order_id,
        transition: None,
    }
}

// =============================================================================
//  ENTREGA (relay do outbox)
// =============================================================================

/// Destino final das notificações.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), AppError>;
}

/// Insert direto na tabela `notifications` (contexto de servidor).
pub struct DatabaseSink {
    pool: PgPool,
    repo: NotificationRepository,
}

impl DatabaseSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, repo: NotificationRepository::new() }
    }
}

#[async_trait]
impl NotificationSink for DatabaseSink {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), AppError> {
        self.repo.insert_notification(&self.pool, payload).await
    }
}

/// POST para o endpoint interno de notificações.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl NotificationSink for HttpSink {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), AppError> {
        self.client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Entrega um lote; cada linha tem seu próprio resultado.
pub async fn deliver_batch(
    sink: &dyn NotificationSink,
    entries: &[OutboxEntry],
) -> Vec<(Uuid, Result<(), String>)> {
    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        let payload = NotificationPayload::from(entry);
        let outcome = sink.deliver(&payload).await.map_err(|e| e.to_string());
        results.push((entry.id, outcome));
    }
    results
}

/// Lê o outbox e entrega pelo menos uma vez.
#[derive(Clone)]
pub struct OutboxRelay {
    pool: PgPool,
    repo: NotificationRepository,
    sink: Arc<dyn NotificationSink>,
    interval: Duration,
}

impl OutboxRelay {
    pub fn new(pool: PgPool, sink: Arc<dyn NotificationSink>, interval: Duration) -> Self {
        Self {
            pool,
            repo: NotificationRepository::new(),
            sink,
            interval,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.relay_once().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Outbox: {} notificações processadas", n),
                Err(e) => tracing::warn!("Outbox: falha ao processar lote: {}", e),
            }
        }
    }

    /// Processa um lote; retorna quantas linhas foram tentadas.
    pub async fn relay_once(&self) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;

        let entries = self
            .repo
            .claim_pending(&mut *tx, MAX_DELIVERY_ATTEMPTS, RELAY_BATCH_SIZE)
            .await?;
        if entries.is_empty() {
            return Ok(0);
        }

        for (id, outcome) in deliver_batch(self.sink.as_ref(), &entries).await {
            match outcome {
                Ok(()) => self.repo.mark_delivered(&mut *tx, id).await?,
                Err(error) => {
                    tracing::warn!("Falha ao entregar notificação {}: {}", id, error);
                    self.repo.mark_failed(&mut *tx, id, &error).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentMethod;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    struct RecordingSink {
        delivered: Mutex<Vec<NotificationPayload>>,
        fail_kind: Option<&'static str>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, payload: &NotificationPayload) -> Result<(), AppError> {
            if self.fail_kind == Some(payload.kind.as_str()) {
                return Err(AppError::InternalServerError(anyhow::anyhow!("endpoint fora do ar")));
            }
            self.delivered.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn entry(kind: &str) -> OutboxEntry {
        OutboxEntry {
            id: Uuid::new_v4(),
            recipient_user_id: None,
            recipient_role: "admin".into(),
            kind: kind.into(),
            title: "t".into(),
            body: "b".into(),
            meta: json!({}),
            dedupe_key: kind.into(),
            attempts: 0,
            last_error: None,
            delivered_at: None,
            created_at: Utc::now(),
        }
    }

    fn order(user_id: Option<Uuid>) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: "ORD-20250110-AAAAAA".into(),
            user_id,
            status: OrderStatus::Delivered,
            is_external: false,
            is_paid: true,
            payment_method: PaymentMethod::CashOnDelivery,
            subtotal: Decimal::from(100),
            tax: Decimal::ZERO,
            total: Decimal::from(100),
            currency: "CDF".into(),
            refund_status: crate::models::order::RefundStatus::None,
            refund_requested: false,
            refund_reason: None,
            refund_requested_at: None,
            refund_expires_at: None,
            delivered_at: Some(Utc::now()),
            stock_deducted: true,
            customer_name: "Amani".into(),
            customer_email: None,
            customer_phone: "0990000000".into(),
            delivery_address: "Av. Kasa-Vubu 12".into(),
            delivery_city: "Kinshasa".into(),
            delivery_notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failures_are_reported_per_entry() {
        let sink = RecordingSink { delivered: Mutex::new(vec![]), fail_kind: Some("refund_rejected") };
        let entries = vec![entry("refund_requested"), entry("refund_rejected"), entry("order_created")];

        let results = deliver_batch(&sink, &entries).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());
        assert_eq!(sink.delivered.lock().unwrap().len(), 2);
    }

    #[test]
    fn admin_refund_notice_names_customer_city_product_reason() {
        let order = order(None);
        let n = refund_requested(&order, None, "Produto quebrado");
        assert_eq!(n.recipient_role, RecipientRole::Admin);
        assert!(n.body.contains("Amani"));
        assert!(n.body.contains("Kinshasa"));
        assert!(n.body.contains("Pedido inteiro"));
        assert!(n.body.contains("Produto quebrado"));
    }

    #[test]
    fn customer_notices_need_an_owner() {
        let guest = order(None);
        assert!(refund_answered(&guest, None, true).is_none());
        assert!(order_status_changed(&guest, OrderStatus::Shipped).is_none());

        let owner = Uuid::new_v4();
        let owned = order(Some(owner));
        let n = refund_answered(&owned, None, false).unwrap();
        assert_eq!(n.kind, NotificationKind::RefundRejected);
        assert_eq!(n.recipient_user_id, Some(owner));

        let n = order_status_changed(&owned, OrderStatus::Shipped).unwrap();
        assert!(n.body.contains("shipped"));
    }

    #[test]
    fn each_status_change_gets_its_own_dedupe_key() {
        let owned = order(Some(Uuid::new_v4()));
        let processing = order_status_changed(&owned, OrderStatus::Processing).unwrap();
        let delivered = order_status_changed(&owned, OrderStatus::Delivered).unwrap();

        assert_ne!(processing.dedupe_key(), delivered.dedupe_key());
        assert_eq!(
            processing.dedupe_key(),
            order_status_changed(&owned, OrderStatus::Processing).unwrap().dedupe_key()
        );
    }
}
