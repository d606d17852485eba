pub extern crate actix_web;

pub mod config;
pub mod connection;
mod connection_tx_storage;
pub mod handlers;
pub mod lifecycle;
pub mod server;
pub mod session;
pub mod session_store;
