pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod http;
pub mod limits;
pub mod model;
pub mod observability;
