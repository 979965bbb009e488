pub mod credentials;
pub mod health;
pub mod mpesa_handlers;
pub mod transactions;
