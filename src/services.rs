pub mod auth;
pub mod inventory_service;
pub mod kpay;
pub mod notification_service;
pub mod order_calculator;
pub mod order_service;
pub mod payment_poller;
pub mod payment_service;
pub mod refund_service;
pub mod rider_service;
pub mod settings_service;
