pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod money;
pub mod query;
pub mod storage;
pub mod validate;
