//! Tracing / logging initialisation.

use crowwatch_core::LogConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directives: "info,crowwatch_ws=debug" etc.
pub fn directives(config: &LogConfig) -> String {
    let mut directives = config.level.clone();
    let mut components: Vec<_> = config.components.iter().collect();
    components.sort();
    for (component, level) in components {
        directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
    }
    directives
}

/// Install the global subscriber. Call once, before the monitor starts.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(directives(config)).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_overrides_are_appended() {
        let mut config = LogConfig::default();
        config.components.insert("crowwatch-ws".into(), "debug".into());
        config.components.insert("crowwatch-core".into(), "trace".into());
        assert_eq!(directives(&config), "info,crowwatch_core=trace,crowwatch_ws=debug");
    }

    #[test]
    fn bare_level() {
        let config = LogConfig { level: "warn".into(), ..LogConfig::default() };
        assert_eq!(directives(&config), "warn");
    }
}
