pub mod connection;
pub mod credentials;
pub mod ledger;
pub mod memory;
pub mod offers;
