pub mod config;
pub mod export;
pub mod http;
pub mod keywords;
pub mod notify;
pub mod persistence;
pub mod replies;
pub mod report;
pub mod roles;
pub mod scheduler;
pub mod service;
pub mod shift;
pub mod speech;
pub mod storage;
pub mod store;
pub mod telegram_bot;
pub mod transfer;
pub mod types;
