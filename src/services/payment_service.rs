// src/services/payment_service.rs

use std::sync::Arc;

use sqlx::{Acquire, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{OrderRepository, PaymentRepository},
    middleware::auth::AuthenticatedUser,
    models::{
        order::{Order, OrderStatus},
        payment::{
            FinalizeResponse, InitiatePaymentRequest, InitiatePaymentResponse, KpayWebhookPayload,
            LinkPaymentRequest, ORDER_CANCELLED_REASON, Payment, PaymentMethod, PaymentStatus,
            PaymentStatusResponse, cod_reference,
        },
    },
    services::{
        kpay::{CollectionRequest, KpayProvider, verify_signature},
        notification_service::{self, NotificationService},
        order_service::ensure_can_access,
    },
};

pub const DEFAULT_CURRENCY: &str = "CDF";

/// Referência enviada à KPay (`KP-` + 10 hex maiúsculos).
pub fn new_kpay_reference() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("KP-{}", &id[..10])
}

/// O que fazer com um callback do provedor, dado o estado gravado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAction {
    /// Mesmo status de novo: nada a fazer.
    Duplicate,
    /// Pagamento já finalizado com outro status: não regride.
    Ignore,
    Apply,
}

pub fn webhook_action(current: PaymentStatus, incoming: PaymentStatus) -> WebhookAction {
    if current == incoming {
        WebhookAction::Duplicate
    } else if current.is_final() {
        WebhookAction::Ignore
    } else {
        WebhookAction::Apply
    }
}

/// Fechamento dos pagamentos COD pendentes quando o pedido muda de status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodSettlement {
    pub status: PaymentStatus,
    pub failure_reason: Option<&'static str>,
}

pub fn cod_settlement(order_status: OrderStatus) -> Option<CodSettlement> {
    match order_status {
        OrderStatus::Delivered => Some(CodSettlement {
            status: PaymentStatus::Completed,
            failure_reason: None,
        }),
        OrderStatus::Cancelled => Some(CodSettlement {
            status: PaymentStatus::Failed,
            failure_reason: Some(ORDER_CANCELLED_REASON),
        }),
        _ => None,
    }
}

#[derive(Clone)]
pub struct PaymentService {
    payment_repo: PaymentRepository,
    order_repo: OrderRepository,
    notifier: NotificationService,
    provider: Option<Arc<dyn KpayProvider>>,
    webhook_secret: Option<String>,
}

impl PaymentService {
    pub fn new(
        payment_repo: PaymentRepository,
        order_repo: OrderRepository,
        notifier: NotificationService,
        provider: Option<Arc<dyn KpayProvider>>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            payment_repo,
            order_repo,
            notifier,
            provider,
            webhook_secret,
        }
    }

    // =========================================================================
    //  CICLO DE VIDA COD (chamado dentro da transação do pedido)
    // =========================================================================

    pub async fn create_cod_payment(
        &self,
        conn: &mut PgConnection,
        order: &Order,
    ) -> Result<Payment, AppError> {
        self.payment_repo
            .create_payment(
                conn,
                Some(order.id),
                &cod_reference(&order.order_number),
                PaymentMethod::CashOnDelivery,
                order.total,
                &order.currency,
                Some(&order.customer_phone),
            )
            .await
    }

    /// Entrega conclui e cancelamento falha os pagamentos COD pendentes.
    /// Devolve quantos pagamentos mudaram.
    pub async fn settle_cod(
        &self,
        conn: &mut PgConnection,
        order_id: Uuid,
        order_status: OrderStatus,
    ) -> Result<usize, AppError> {
        let Some(settlement) = cod_settlement(order_status) else {
            return Ok(0);
        };
        let settled = self
            .payment_repo
            .settle_pending_cod(conn, order_id, settlement.status, settlement.failure_reason)
            .await?;
        if !settled.is_empty() {
            tracing::info!(
                "💵 {} pagamento(s) COD do pedido {} agora {:?}",
                settled.len(),
                order_id,
                settlement.status
            );
        }
        Ok(settled.len())
    }

    // =========================================================================
    //  KPAY
    // =========================================================================

    pub async fn initiate<'e, E>(
        &self,
        executor: E,
        payload: &InitiatePaymentRequest,
    ) -> Result<InitiatePaymentResponse, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let provider = self
            .provider
            .as_ref()
            .ok_or(AppError::PaymentProviderUnavailable)?;

        let reference = new_kpay_reference();
        let currency = payload.currency.as_deref().unwrap_or(DEFAULT_CURRENCY);

        let mut tx = executor.begin().await?;

        let payment = self
            .payment_repo
            .create_payment(
                &mut *tx,
                None,
                &reference,
                PaymentMethod::Kpay,
                payload.amount,
                currency,
                Some(&payload.phone),
            )
            .await?;

        // Só confirma a linha se o provedor aceitou a cobrança.
        provider
            .request_collection(&CollectionRequest {
                reference: &reference,
                phone: &payload.phone,
                amount: payload.amount,
                currency,
            })
            .await?;

        tx.commit().await?;

        Ok(InitiatePaymentResponse {
            reference: payment.reference,
            status: payment.status,
        })
    }

    pub async fn status<'e, E>(&self, executor: E, reference: &str) -> Result<PaymentStatusResponse, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let payment = self
            .payment_repo
            .find_by_reference(&mut *tx, reference)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        tx.commit().await?;

        Ok(PaymentStatusResponse {
            order_id: payment.order_id,
            status: payment.status,
        })
    }

    pub async fn finalize<'e, E>(&self, executor: E, reference: &str) -> Result<FinalizeResponse, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let payment = self
            .payment_repo
            .find_by_reference(&mut *tx, reference)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        tx.commit().await?;

        Ok(FinalizeResponse::for_payment(&payment))
    }

    pub async fn list_for_order<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        order_id: Uuid,
    ) -> Result<Vec<Payment>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let order = self
            .order_repo
            .find_by_id(&mut *tx, order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        ensure_can_access(actor, &order)?;

        let payments = self.payment_repo.list_by_order(&mut *tx, order_id).await?;
        tx.commit().await?;
        Ok(payments)
    }

    /// Vincula uma referência confirmada a um pedido criado depois do pagamento.
    pub async fn link<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        payload: &LinkPaymentRequest,
    ) -> Result<Payment, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let order = self
            .order_repo
            .find_by_id_for_update(&mut *tx, payload.order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        ensure_can_access(actor, &order)?;

        let payment = self
            .link_reference(&mut tx, &order, &payload.reference)
            .await?;

        tx.commit().await?;
        Ok(payment)
    }

    /// Liga o pagamento ao pedido e marca pago se já estiver concluído.
    pub async fn link_reference(
        &self,
        conn: &mut PgConnection,
        order: &Order,
        reference: &str,
    ) -> Result<Payment, AppError> {
        let payment = self
            .payment_repo
            .find_by_reference_for_update(&mut *conn, reference)
            .await?
            .ok_or(AppError::PaymentNotFound)?;

        match payment.order_id {
            Some(linked) if linked != order.id => return Err(AppError::PaymentAlreadyLinked),
            _ => {}
        }

        let payment = self
            .payment_repo
            .link_to_order(&mut *conn, payment.id, order.id)
            .await?;

        if payment.status == PaymentStatus::Completed {
            self.order_repo.set_paid(&mut *conn, order.id).await?;
        }

        Ok(payment)
    }

    // =========================================================================
    //  WEBHOOK
    // =========================================================================

    pub fn verify_webhook(&self, body: &[u8], signature: Option<&str>) -> Result<(), AppError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or(AppError::InvalidSignature)?;
        let signature = signature.ok_or(AppError::InvalidSignature)?;

        if verify_signature(secret, body, signature) {
            Ok(())
        } else {
            Err(AppError::InvalidSignature)
        }
    }

    /// Callback assinado da KPay. Reentregas do mesmo status são ignoradas.
    pub async fn handle_webhook<'e, E>(
        &self,
        executor: E,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<Payment, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        self.verify_webhook(body, signature)?;

        let payload: KpayWebhookPayload =
            serde_json::from_slice(body).map_err(|e| AppError::InvalidPayload(e.to_string()))?;

        let mut tx = executor.begin().await?;

        let payment = self
            .payment_repo
            .find_by_reference_for_update(&mut *tx, &payload.reference)
            .await?
            .ok_or(AppError::PaymentNotFound)?;

        match webhook_action(payment.status, payload.status) {
            WebhookAction::Duplicate => return Ok(payment),
            WebhookAction::Ignore => {
                tracing::warn!(
                    "Webhook KPay {} ignorado: pagamento já está {:?}, recebido {:?}",
                    payload.reference,
                    payment.status,
                    payload.status
                );
                return Ok(payment);
            }
            WebhookAction::Apply => {}
        }

        let updated = self
            .payment_repo
            .update_status(
                &mut *tx,
                payment.id,
                payload.status,
                payload.failure_reason.as_deref(),
            )
            .await?;

        if updated.status == PaymentStatus::Completed {
            if let Some(order_id) = updated.order_id {
                self.order_repo.set_paid(&mut *tx, order_id).await?;
                self.notifier
                    .enqueue(
                        &mut tx,
                        notification_service::payment_completed(order_id, &updated.reference),
                    )
                    .await;
            }
        }

        tx.commit().await?;

        tracing::info!("🔔 Webhook KPay {} -> {:?}", updated.reference, updated.status);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_are_prefixed_and_unique() {
        let a = new_kpay_reference();
        let b = new_kpay_reference();
        assert!(a.starts_with("KP-"));
        assert_eq!(a.len(), 13);
        assert_ne!(a, b);
    }

    #[test]
    fn webhook_redelivery_is_a_no_op() {
        assert_eq!(
            webhook_action(PaymentStatus::Completed, PaymentStatus::Completed),
            WebhookAction::Duplicate
        );
        assert_eq!(
            webhook_action(PaymentStatus::Pending, PaymentStatus::Pending),
            WebhookAction::Duplicate
        );
    }

    #[test]
    fn final_payments_never_regress() {
        assert_eq!(
            webhook_action(PaymentStatus::Completed, PaymentStatus::Failed),
            WebhookAction::Ignore
        );
        assert_eq!(
            webhook_action(PaymentStatus::Failed, PaymentStatus::Completed),
            WebhookAction::Ignore
        );
        assert_eq!(
            webhook_action(PaymentStatus::Pending, PaymentStatus::Completed),
            WebhookAction::Apply
        );
    }

    #[test]
    fn webhook_needs_secret_and_valid_signature() {
        let body = br#"{"reference":"KP-1","status":"completed"}"#;
        let service = PaymentService::new(
            PaymentRepository::new(),
            OrderRepository::new(),
            NotificationService::new(Default::default(), 60),
            None,
            Some("segredo".into()),
        );
        let signature = crate::services::kpay::sign_payload("segredo", body).unwrap();

        assert!(service.verify_webhook(body, Some(&signature)).is_ok());
        assert!(matches!(
            service.verify_webhook(body, None),
            Err(AppError::InvalidSignature)
        ));
        assert!(matches!(
            service.verify_webhook(body, Some("00")),
            Err(AppError::InvalidSignature)
        ));

        let unconfigured = PaymentService::new(
            PaymentRepository::new(),
            OrderRepository::new(),
            NotificationService::new(Default::default(), 60),
            None,
            None,
        );
        assert!(unconfigured.verify_webhook(body, Some(&signature)).is_err());
    }

    #[test]
    fn cod_payment_follows_the_order() {
        assert_eq!(
            cod_settlement(OrderStatus::Delivered),
            Some(CodSettlement { status: PaymentStatus::Completed, failure_reason: None })
        );
        assert_eq!(
            cod_settlement(OrderStatus::Cancelled),
            Some(CodSettlement {
                status: PaymentStatus::Failed,
                failure_reason: Some("order_cancelled"),
            })
        );
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Assigned,
            OrderStatus::Shipped,
            OrderStatus::Refunded,
        ] {
            assert_eq!(cod_settlement(status), None);
        }

        // Pagamento já concluído não volta a falhar por um callback atrasado.
        assert_eq!(
            webhook_action(PaymentStatus::Completed, PaymentStatus::Failed),
            WebhookAction::Ignore
        );
    }
}
