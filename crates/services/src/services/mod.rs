pub mod alert_detection;
pub mod analytics_api;
pub mod analytics_integration;
pub mod category;
pub mod config;
pub mod database_validator;
pub mod event_catalog;
pub mod event_volume;
pub mod http_log;
pub mod notification;
pub mod platform_status;
