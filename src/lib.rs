pub mod clock;
pub mod config;
pub mod fingerprint;
pub mod handlers;
pub mod identity;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod orders;
pub mod payment;
pub mod routes;
pub mod state;
pub mod store;
pub mod tickets;
pub mod utils;
