use once_cell::sync::Lazy;
use std::env;

/// Process-wide engine configuration. Resolved once at startup from
/// environment variables; immutable afterwards.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Limit applied when a query asks for none, zero, or too much.
    pub default_limit: i64,
    /// Upper bound a client-supplied limit may take.
    pub max_limit: i64,
    /// When set, DELETE of a missing row answers 200 + `true` instead of 404.
    pub idempotent_delete: bool,
    /// Debug-log filter/order directives dropped by the whitelist.
    pub log_dropped_directives: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 150,
            idempotent_delete: false,
            log_dropped_directives: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("RESTOBJECT_DEFAULT_LIMIT") {
            self.default_limit = v.parse().unwrap_or(self.default_limit);
        }
        if let Ok(v) = env::var("RESTOBJECT_MAX_LIMIT") {
            self.max_limit = v.parse().unwrap_or(self.max_limit);
        }
        if let Ok(v) = env::var("RESTOBJECT_IDEMPOTENT_DELETE") {
            self.idempotent_delete = v.parse().unwrap_or(self.idempotent_delete);
        }
        if let Ok(v) = env::var("RESTOBJECT_LOG_DROPPED") {
            self.log_dropped_directives = v.parse().unwrap_or(self.log_dropped_directives);
        }
        self
    }
}

pub static CONFIG: Lazy<EngineConfig> = Lazy::new(EngineConfig::from_env);

pub fn config() -> &'static EngineConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_limit, 50);
        assert_eq!(cfg.max_limit, 150);
        assert!(!cfg.idempotent_delete);
    }
}
