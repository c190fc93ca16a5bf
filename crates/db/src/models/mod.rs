pub mod alert;
pub mod analytics_settings;
pub mod event_category;
pub mod event_change_log;
pub mod event_version;
pub mod event_volume;
pub mod platform_status;
pub mod tracking_event;
