pub mod orders;
pub mod payments;
pub mod refunds;
pub mod riders;
pub mod settings;
