// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::common::error::ApiError;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Orders ---
        handlers::orders::create_order,
        handlers::orders::list_my_orders,
        handlers::orders::get_order,
        handlers::orders::list_orders,
        handlers::orders::update_order_status,
        handlers::orders::delete_order,

        // --- Refunds ---
        handlers::refunds::request_item_refund,
        handlers::refunds::cancel_item_refund,
        handlers::refunds::respond_item_refund,
        handlers::refunds::request_order_refund,
        handlers::refunds::cancel_order_refund,
        handlers::refunds::respond_order_refund,

        // --- Payments ---
        handlers::payments::initiate_payment,
        handlers::payments::payment_status,
        handlers::payments::finalize_payment,
        handlers::payments::kpay_webhook,
        handlers::payments::list_order_payments,
        handlers::payments::link_payment,

        // --- Riders ---
        handlers::riders::list_riders,
        handlers::riders::create_rider,
        handlers::riders::set_rider_active,
        handlers::riders::assign_rider,
        handlers::riders::reassign_rider,
        handlers::riders::get_order_assignment,
        handlers::riders::list_my_assignments,
        handlers::riders::respond_assignment,

        // --- Settings ---
        handlers::settings::get_orders_enabled,
        handlers::settings::update_orders_enabled,
    ),
    components(
        schemas(
            ApiError,

            // --- Orders ---
            models::order::OrderStatus,
            models::order::RefundStatus,
            models::order::RefundMode,
            models::order::Order,
            models::order::OrderItem,
            models::order::OrderDetail,
            models::order::CreateOrderItemRequest,
            models::order::CreateOrderRequest,
            models::order::UpdateOrderStatusRequest,

            // --- Refunds ---
            models::refund::RequestRefundRequest,
            models::refund::RefundDecision,
            models::refund::RespondRefundRequest,

            // --- Payments ---
            models::payment::PaymentMethod,
            models::payment::PaymentStatus,
            models::payment::Payment,
            models::payment::PaymentReferenceRequest,
            models::payment::PaymentStatusResponse,
            models::payment::FinalizeResponse,
            models::payment::LinkPaymentRequest,
            models::payment::InitiatePaymentRequest,
            models::payment::InitiatePaymentResponse,
            models::payment::KpayWebhookPayload,

            // --- Riders ---
            models::rider::Rider,
            models::rider::AssignmentStatus,
            models::rider::OrderAssignment,
            models::rider::RiderResponse,
            models::rider::CreateRiderRequest,
            models::rider::SetRiderActiveRequest,
            models::rider::AssignRiderRequest,
            models::rider::RespondAssignmentRequest,
            models::rider::OrderAssignmentResponse,

            // --- Settings ---
            models::settings::SettingsSource,
            models::settings::OrdersEnabledResponse,
            models::settings::UpdateOrdersEnabledRequest,

            // --- Auth ---
            models::auth::Role,
        )
    ),
    tags(
        (name = "Orders", description = "Checkout e ciclo de vida dos pedidos"),
        (name = "Refunds", description = "Reembolsos por item e por pedido (janela de 24h)"),
        (name = "Payments", description = "Pagamento na entrega e KPay (mobile money)"),
        (name = "Riders", description = "Entregadores e atribuições"),
        (name = "Settings", description = "Configurações da Loja")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_workflow_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        assert!(paths.contains_key("/api/orders"));
        assert!(paths.contains_key("/api/refunds/items/{item_id}"));
        assert!(paths.contains_key("/api/payments/kpay/webhook"));
        assert!(paths.contains_key("/api/admin/settings/orders-enabled"));
        assert!(doc.components.as_ref().is_some_and(|c| c.security_schemes.contains_key("api_jwt")));
    }
}
