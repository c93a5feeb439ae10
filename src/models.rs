pub mod auth;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod payment;
pub mod refund;
pub mod rider;
pub mod settings;
