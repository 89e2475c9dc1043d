pub mod config;
pub mod data;
pub mod health;
pub mod logs;
pub mod query;
pub mod threads;
pub mod upload;
