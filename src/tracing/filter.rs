use tracing::Level;
use tracing::Metadata;
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::Filter;
use tracing_subscriber::registry::LookupSpan;

const CRATE_TARGET: &str = "curvekeeper";

fn from_crate(meta: &Metadata<'_>) -> bool {
    meta.target().starts_with(CRATE_TARGET)
}

/// Which levels each sink receives.
pub fn debug_only(level: &Level) -> bool {
    *level == Level::DEBUG
}

pub fn error_or_warn(level: &Level) -> bool {
    *level == Level::ERROR || *level == Level::WARN
}

pub fn error_only(level: &Level) -> bool {
    *level == Level::ERROR
}

pub fn info_only(level: &Level) -> bool {
    *level == Level::INFO
}

pub struct DebugOnlyFilter;

impl<S> Filter<S> for DebugOnlyFilter
where
    S: tracing::Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn enabled(
        &self,
        meta: &Metadata<'_>,
        _ctx: &Context<'_, S>,
    ) -> bool {
        debug_only(meta.level()) && from_crate(meta)
    }
}

pub struct ErrorWarnFilter;

impl<S> Filter<S> for ErrorWarnFilter
where
    S: tracing::Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn enabled(
        &self,
        meta: &Metadata<'_>,
        _ctx: &Context<'_, S>,
    ) -> bool {
        error_or_warn(meta.level()) && from_crate(meta)
    }
}

pub struct ErrorOnlyFilter;

impl<S> Filter<S> for ErrorOnlyFilter
where
    S: tracing::Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn enabled(
        &self,
        meta: &Metadata<'_>,
        _ctx: &Context<'_, S>,
    ) -> bool {
        error_only(meta.level()) && from_crate(meta)
    }
}

#[cfg(feature = "dev")]
pub struct InfoOnlyFilter;

#[cfg(feature = "dev")]
impl<S> Filter<S> for InfoOnlyFilter
where
    S: tracing::Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn enabled(
        &self,
        meta: &Metadata<'_>,
        _ctx: &Context<'_, S>,
    ) -> bool {
        info_only(meta.level()) && from_crate(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_split_levels() {
        assert!(debug_only(&Level::DEBUG));
        assert!(!debug_only(&Level::INFO));
        assert!(error_or_warn(&Level::WARN));
        assert!(error_or_warn(&Level::ERROR));
        assert!(!error_or_warn(&Level::INFO));
        assert!(error_only(&Level::ERROR));
        assert!(!error_only(&Level::WARN));
        assert!(info_only(&Level::INFO));
    }
}
