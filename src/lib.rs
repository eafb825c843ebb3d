pub mod aliases;
pub mod app_error;
pub mod app_state;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod poller;
pub mod pricing;
pub mod routes;
pub mod scheduling;
pub mod schema;
pub mod swagger;
