use sentry_tracing::{EventFilter, SentryLayer};
use tracing::Level;

/// Initialise sentry from `SENTRY_DSN`. The guard must live as long as `main`;
/// without a DSN this returns `None` and reporting stays off.
pub fn init_once() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|d| !d.is_empty())?;
    let environment = if cfg!(debug_assertions) {
        "dev"
    } else {
        "production"
    };

    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(environment.into()),
            ..Default::default()
        },
    )))
}

pub fn sentry_layer<S>() -> SentryLayer<S>
where
    S: tracing::Subscriber,
    S: for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    SentryLayer::default()
        .span_filter(|meta| matches!(*meta.level(), Level::DEBUG | Level::INFO | Level::WARN | Level::ERROR))
        .event_filter(|meta| match *meta.level() {
            Level::ERROR => EventFilter::Event,
            Level::DEBUG | Level::INFO | Level::WARN => EventFilter::Breadcrumb,
            Level::TRACE => EventFilter::Ignore,
        })
}
