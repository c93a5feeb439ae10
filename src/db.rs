pub mod order_repo;
pub use order_repo::OrderRepository;
pub mod inventory_repo;
pub use inventory_repo::InventoryRepository;
pub mod payment_repo;
pub use payment_repo::PaymentRepository;
pub mod rider_repo;
pub use rider_repo::RiderRepository;
pub mod notification_repo;
pub use notification_repo::NotificationRepository;
pub mod settings_repo;
pub use settings_repo::SettingsRepository;
