pub mod callback;
pub mod credentials;
pub mod mpesa_transactions;
pub mod offer;
