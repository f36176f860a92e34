pub mod cache;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod logger;
pub mod middleware;
pub mod router;
pub mod status;
pub mod validation;
pub mod value;
