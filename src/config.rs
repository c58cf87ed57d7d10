use crate::error::{LangError, LangResult};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;
pub const DEFAULT_PROMPT: &str = ">>> ";
pub const MAX_CALL_DEPTH_VAR: &str = "TANG_MAX_CALL_DEPTH";

/// Session settings shared by the interactive loop and the file runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Nested function calls allowed before evaluation fails with an error.
    pub max_call_depth: usize,
    pub prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Defaults, overridden by `TANG_MAX_CALL_DEPTH` when it is set.
    pub fn from_env() -> LangResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LangResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_CALL_DEPTH_VAR) {
            config.max_call_depth = match raw.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => depth,
                _ => {
                    return Err(LangError::Usage(format!(
                        "{} must be a positive integer, got '{}'",
                        MAX_CALL_DEPTH_VAR, raw
                    )))
                }
            };
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_overrides() {
        let config = Config::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config, Config::default());
        assert_eq!(config.max_call_depth, 1024);
        assert_eq!(config.prompt, ">>> ");
    }

    #[test]
    fn call_depth_override() {
        let config = Config::from_lookup(|key| {
            (key == MAX_CALL_DEPTH_VAR).then(|| " 64 ".to_string())
        })
        .expect("override is valid");
        assert_eq!(config.max_call_depth, 64);
    }

    #[test]
    fn invalid_call_depth_is_a_usage_error() {
        for raw in ["0", "-3", "deep"] {
            let result = Config::from_lookup(|_| Some(raw.to_string()));
            assert!(matches!(result, Err(LangError::Usage(_))), "{}", raw);
        }
    }
}
