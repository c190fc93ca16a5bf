use std::{env, fs, path::PathBuf};

use ts_rs::TS;

fn generate_types_content() -> String {
    let decls = [
        utils::response::ApiResponse::<()>::decl(),
        db::models::event_category::EventCategory::decl(),
        db::models::event_category::EventCategoryWithCount::decl(),
        db::models::event_category::CreateEventCategory::decl(),
        db::models::event_category::UpdateEventCategory::decl(),
        db::models::tracking_event::EventStatus::decl(),
        db::models::tracking_event::TrackingEvent::decl(),
        db::models::tracking_event::TrackingEventDetail::decl(),
        db::models::tracking_event::CreateTrackingEvent::decl(),
        db::models::tracking_event::UpdateTrackingEvent::decl(),
        db::models::tracking_event::TrackingEventFilter::decl(),
        db::models::tracking_event::Paginated::<()>::decl(),
        db::models::event_version::PropertyType::decl(),
        db::models::event_version::PropertyDefinition::decl(),
        db::models::event_version::EventVersion::decl(),
        db::models::event_version::CreateEventVersion::decl(),
        db::models::event_version::EventVersionDiff::decl(),
        db::models::platform_status::Platform::decl(),
        db::models::platform_status::ImplementationStatus::decl(),
        db::models::platform_status::ValidationStatus::decl(),
        db::models::platform_status::PlatformStatus::decl(),
        db::models::platform_status::UpdatePlatformStatus::decl(),
        db::models::platform_status::PlatformCoverage::decl(),
        db::models::event_change_log::ChangeAction::decl(),
        db::models::event_change_log::EventChangeLog::decl(),
        db::models::event_change_log::EventChangeLogWithEvent::decl(),
        db::models::event_volume::EventVolume::decl(),
        db::models::event_volume::DailyCount::decl(),
        db::models::event_volume::IngestEventVolumes::decl(),
        db::models::alert::AlertStatus::decl(),
        db::models::alert::EventAlertRule::decl(),
        db::models::alert::UpsertEventAlertRule::decl(),
        db::models::alert::EventAlert::decl(),
        db::models::alert::EventAlertWithEvent::decl(),
        db::models::alert::EventAlertFilter::decl(),
        db::models::analytics_settings::AnalyticsSettings::decl(),
        db::models::analytics_settings::UpdateAnalyticsSettings::decl(),
        services::services::alert_detection::EffectiveAlertRule::decl(),
        services::services::event_volume::VolumeSyncReport::decl(),
        services::services::http_log::HttpLogEntry::decl(),
        services::services::http_log::HttpLogStats::decl(),
        server::routes::health::HealthStatus::decl(),
        server::routes::volumes::IngestResult::decl(),
        server::routes::alerts::DetectionRunResult::decl(),
        server::routes::analytics_settings::ConnectionTestResult::decl(),
        server::routes::http_logs::ClearHttpLogsResult::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|d| {
            let trimmed = d.trim_start();
            if trimmed.starts_with("export") {
                d
            } else {
                format!("export {trimmed}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "// This file was generated by `generate_types`. Do not edit manually.\n\n{}\n",
        body
    )
}

fn main() {
    let check_mode = env::args().any(|arg| arg == "--check");
    let out_dir = PathBuf::from(env::var("TYPES_OUT_DIR").unwrap_or_else(|_| "shared".to_string()));
    let out_path = out_dir.join("types.ts");
    let generated = generate_types_content();

    if check_mode {
        let current = fs::read_to_string(&out_path).unwrap_or_default();
        if current == generated {
            println!("✅ {} is up to date.", out_path.display());
            std::process::exit(0);
        }
        eprintln!("❌ {} is not up to date. Run generate_types.", out_path.display());
        std::process::exit(1);
    }

    if let Err(e) = fs::create_dir_all(&out_dir).and_then(|_| fs::write(&out_path, generated)) {
        eprintln!("Failed to write {}: {e}", out_path.display());
        std::process::exit(1);
    }
    println!("✅ TypeScript types generated in {}", out_path.display());
}
