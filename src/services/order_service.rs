// src/services/order_service.rs

use chrono::{DateTime, Utc};
use sqlx::{Acquire, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        OrderRepository, PaymentRepository,
        order_repo::{NewOrder, NewOrderItem},
    },
    middleware::auth::AuthenticatedUser,
    models::{
        auth::Role,
        order::{CreateOrderRequest, ListOrdersQuery, Order, OrderDetail, OrderStatus},
        payment::{PaymentMethod, PaymentStatus},
    },
    services::{
        inventory_service::InventoryService,
        notification_service::{self, NotificationService},
        order_calculator::{checkout_totals, line_total},
        payment_service::{DEFAULT_CURRENCY, PaymentService},
        settings_service::SettingsService,
    },
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

// ---
// Regras puras
// ---

/// Ids que não são UUID válidos viram `None` (o item continua no pedido).
pub fn parse_optional_uuid(raw: Option<&str>) -> Option<Uuid> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// `ORD-YYYYMMDD-XXXXXX`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), &suffix[..6])
}

/// Admin vê tudo; cliente só os próprios pedidos.
pub fn ensure_can_access(actor: &AuthenticatedUser, order: &Order) -> Result<(), AppError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Customer if order.user_id == Some(actor.id) => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}

pub fn page_bounds(query: &ListOrdersQuery) -> (i64, i64) {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Dinheiro recebido na entrega: pedido COD, ou algum pagamento COD acabou de fechar.
pub fn cash_collected(method: PaymentMethod, cod_settled: usize) -> bool {
    method.is_cod() || cod_settled > 0
}

#[derive(Clone)]
pub struct OrderService {
    order_repo: OrderRepository,
    payment_repo: PaymentRepository,
    inventory: InventoryService,
    payments: PaymentService,
    notifier: NotificationService,
    settings: SettingsService,
}

impl OrderService {
    pub fn new(
        order_repo: OrderRepository,
        payment_repo: PaymentRepository,
        inventory: InventoryService,
        payments: PaymentService,
        notifier: NotificationService,
        settings: SettingsService,
    ) -> Self {
        Self {
            order_repo,
            payment_repo,
            inventory,
            payments,
            notifier,
            settings,
        }
    }

    // =========================================================================
    //  CHECKOUT
    // =========================================================================

    pub async fn create_order<'e, E>(
        &self,
        executor: E,
        actor: Option<&AuthenticatedUser>,
        payload: &CreateOrderRequest,
    ) -> Result<OrderDetail, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let policy = self.settings.checkout_policy(&mut *tx).await?;
        policy.ensure_open()?;

        // Pedido externo (venda por telefone/WhatsApp) é coisa da equipe.
        let is_admin = actor.is_some_and(|a| a.role == Role::Admin);
        let is_external = payload.is_external && is_admin;

        let lines: Vec<NewOrderItem<'_>> = payload
            .items
            .iter()
            .map(|item| {
                Ok(NewOrderItem {
                    product_id: parse_optional_uuid(item.product_id.as_deref()),
                    variation_id: parse_optional_uuid(item.variation_id.as_deref()),
                    product_name: &item.product_name,
                    quantity: item.quantity,
                    price: item.price,
                    total: line_total(item.price, item.quantity)?,
                })
            })
            .collect::<Result<_, AppError>>()?;

        let line_totals: Vec<_> = lines.iter().map(|l| l.total).collect();
        let totals = checkout_totals(
            &line_totals,
            is_external,
            policy.tax_rate,
            payload.transport_fee.unwrap_or_default(),
        )?;

        // Pagamento KPay confirmado antes do pedido existir (fluxo "finalize").
        let confirmed_payment = match payload.payment_reference.as_deref() {
            Some(reference) if payload.payment_method == PaymentMethod::Kpay => Some(
                self.payment_repo
                    .find_by_reference_for_update(&mut *tx, reference)
                    .await?
                    .ok_or(AppError::PaymentNotFound)?,
            ),
            _ => None,
        };
        let is_paid = confirmed_payment
            .as_ref()
            .is_some_and(|p| p.status == PaymentStatus::Completed);

        let order_number = generate_order_number(Utc::now());
        let currency = payload.currency.as_deref().unwrap_or(DEFAULT_CURRENCY);

        let order = self
            .order_repo
            .create_order(
                &mut *tx,
                &NewOrder {
                    order_number: &order_number,
                    user_id: actor.map(|a| a.id),
                    is_external,
                    is_paid,
                    payment_method: payload.payment_method,
                    totals,
                    currency,
                    customer_name: &payload.customer_name,
                    customer_email: payload.customer_email.as_deref(),
                    customer_phone: &payload.customer_phone,
                    delivery_address: &payload.delivery_address,
                    delivery_city: &payload.delivery_city,
                    delivery_notes: payload.delivery_notes.as_deref(),
                },
            )
            .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            items.push(self.order_repo.add_item(&mut *tx, order.id, line).await?);
        }

        if order.payment_method.is_cod() {
            self.payments.create_cod_payment(&mut tx, &order).await?;
        }
        if let Some(payment) = &confirmed_payment {
            self.payments
                .link_reference(&mut tx, &order, &payment.reference)
                .await?;
        }

        self.notifier
            .enqueue(&mut tx, notification_service::order_created(&order))
            .await;

        tx.commit().await?;

        tracing::info!("🛒 Pedido {} criado ({} itens, total {})", order.order_number, items.len(), order.total);
        Ok(OrderDetail { header: order, items })
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn get_order<'e, E>(
        &self,
        executor: E,
        actor: &AuthenticatedUser,
        order_id: Uuid,
    ) -> Result<OrderDetail, AppError>
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

        let items = self.order_repo.list_items(&mut *tx, order_id).await?;
        tx.commit().await?;
        Ok(OrderDetail { header: order, items })
    }

    pub async fn list_orders<'e, E>(&self, executor: E, query: &ListOrdersQuery) -> Result<Vec<Order>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let (limit, offset) = page_bounds(query);
        let mut tx = executor.begin().await?;
        let orders = self
            .order_repo
            .list_orders(&mut *tx, query.status, limit, offset)
            .await?;
        tx.commit().await?;
        Ok(orders)
    }

    pub async fn list_my_orders<'e, E>(&self, executor: E, actor: &AuthenticatedUser) -> Result<Vec<Order>, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let orders = self.order_repo.list_by_user(&mut *tx, actor.id).await?;
        tx.commit().await?;
        Ok(orders)
    }

    // =========================================================================
    //  STATUS
    // =========================================================================

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let order = self
            .order_repo
            .find_by_id_for_update(&mut *tx, order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        order.status.ensure_can_move_to(status)?;

        let updated = self.apply_status(&mut tx, &order, status).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Muda o status e dispara os efeitos de cada transição.
    /// `order` precisa estar travado (`FOR UPDATE`) pela transação do chamador.
    pub(crate) async fn apply_status(
        &self,
        conn: &mut PgConnection,
        order: &Order,
        status: OrderStatus,
    ) -> Result<Order, AppError> {
        let updated = match status {
            OrderStatus::Delivered => {
                // A baixa acontece uma vez só, mesmo que o status seja reaplicado.
                if !order.stock_deducted {
                    let items = self.order_repo.list_items(&mut *conn, order.id).await?;
                    self.inventory
                        .deduct_for_delivery(&mut *conn, order.id, &items)
                        .await;
                }
                let settled = self.payments.settle_cod(&mut *conn, order.id, status).await?;
                self.order_repo
                    .mark_delivered(
                        &mut *conn,
                        order.id,
                        Utc::now(),
                        cash_collected(order.payment_method, settled),
                    )
                    .await?
            }
            _ => {
                self.payments.settle_cod(&mut *conn, order.id, status).await?;
                self.order_repo
                    .update_status(&mut *conn, order.id, status)
                    .await?
            }
        };

        if order.status != updated.status {
            if let Some(notification) = notification_service::order_status_changed(&updated, updated.status) {
                self.notifier.enqueue(&mut *conn, notification).await;
            }
        }

        Ok(updated)
    }

    pub async fn delete_order<'e, E>(&self, executor: E, order_id: Uuid) -> Result<(), AppError>
    where
        E: Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let deleted = self.order_repo.delete_order(&mut *tx, order_id).await?;
        if deleted == 0 {
            return Err(AppError::OrderNotFound);
        }
        tx.commit().await?;
        tracing::info!("🗑️ Pedido {} apagado", order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::RefundStatus;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser { id: Uuid::new_v4(), role }
    }

    fn order(owner: Option<Uuid>) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: "ORD-20250110-AAAAAA".into(),
            user_id: owner,
            status: OrderStatus::Pending,
            is_external: false,
            is_paid: false,
            payment_method: PaymentMethod::CashOnDelivery,
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: "CDF".into(),
            refund_status: RefundStatus::None,
            refund_requested: false,
            refund_reason: None,
            refund_requested_at: None,
            refund_expires_at: None,
            delivered_at: None,
            stock_deducted: false,
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

    #[test]
    fn invalid_ids_become_none() {
        let id = Uuid::new_v4();
        assert_eq!(parse_optional_uuid(Some(&id.to_string())), Some(id));
        assert_eq!(parse_optional_uuid(Some("prod-123")), None);
        assert_eq!(parse_optional_uuid(Some("   ")), None);
        assert_eq!(parse_optional_uuid(None), None);
    }

    #[test]
    fn order_number_format() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let number = generate_order_number(now);
        assert!(number.starts_with("ORD-20250110-"));
        assert_eq!(number.len(), "ORD-20250110-".len() + 6);
        assert!(number[13..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn customers_only_reach_their_own_orders() {
        let customer = user(Role::Customer);
        assert!(ensure_can_access(&customer, &order(Some(customer.id))).is_ok());
        assert!(matches!(
            ensure_can_access(&customer, &order(Some(Uuid::new_v4()))),
            Err(AppError::Forbidden)
        ));
        assert!(ensure_can_access(&customer, &order(None)).is_err());

        assert!(ensure_can_access(&user(Role::Admin), &order(None)).is_ok());
        assert!(ensure_can_access(&user(Role::Rider), &order(None)).is_err());
    }

    #[test]
    fn paging_is_clamped() {
        let q = |limit, offset| ListOrdersQuery { status: None, limit, offset };
        assert_eq!(page_bounds(&q(None, None)), (DEFAULT_PAGE_SIZE, 0));
        assert_eq!(page_bounds(&q(Some(10_000), Some(-5))), (MAX_PAGE_SIZE, 0));
        assert_eq!(page_bounds(&q(Some(0), Some(20))), (1, 20));
    }

    #[test]
    fn delivery_records_cash_for_cod_orders() {
        assert!(cash_collected(PaymentMethod::CashOnDelivery, 0));
        assert!(cash_collected(PaymentMethod::Kpay, 1));
        assert!(!cash_collected(PaymentMethod::Kpay, 0));
    }
}
