//! Application configuration.

/// Configuration for creating an application.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name attached to log events and `Debug` output.
    pub label: String,

    /// Whether to emit a warning per observer failure during publish.
    pub log_observer_failures: bool,

    /// Whether to maintain statistics counters.
    pub collect_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            label: "application".to_string(),
            log_observer_failures: true,
            collect_stats: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets whether observer failures are logged as they are collected.
    #[must_use]
    pub const fn log_observer_failures(mut self, value: bool) -> Self {
        self.log_observer_failures = value;
        self
    }

    /// Sets whether statistics are collected.
    #[must_use]
    pub const fn collect_stats(mut self, value: bool) -> Self {
        self.collect_stats = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.label, "application");
        assert!(config.log_observer_failures);
        assert!(config.collect_stats);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .label("editor")
            .log_observer_failures(false)
            .collect_stats(false);

        assert_eq!(config.label, "editor");
        assert!(!config.log_observer_failures);
        assert!(!config.collect_stats);
    }
}
