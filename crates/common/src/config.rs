use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// String variable with a default.
pub fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parsed variable; missing or unparsable values fall back to `default`.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Parsed variable clamped to `[min, max]`.
pub fn env_clamped<T>(key: &str, default: T, min: T, max: T) -> T
where
    T: FromStr + PartialOrd,
{
    let value = env_parse(key, default);
    if value < min {
        tracing::warn!(key, "Configured value below minimum, clamping");
        min
    } else if value > max {
        tracing::warn!(key, "Configured value above maximum, clamping");
        max
    } else {
        value
    }
}

/// Boolean variable accepting `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key).map(|v| v.trim().to_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Optional variable; blank counts as unset.
pub fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_var<R>(key: &str, value: Option<&str>, f: impl FnOnce() -> R) -> R {
        // SAFETY: tests touching the environment run serially.
        unsafe {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        let out = f();
        unsafe { env::remove_var(key) };
        out
    }

    #[test]
    #[serial]
    fn environment_defaults_to_development() {
        with_var("ENVIRONMENT", None, || {
            assert_eq!(Environment::from_env(), Environment::Development);
        });
        with_var("ENVIRONMENT", Some("PROD"), || {
            assert_eq!(Environment::from_env(), Environment::Production);
        });
    }

    #[test]
    #[serial]
    fn parse_falls_back_on_garbage() {
        with_var("COMMON_TEST_NUM", Some("abc"), || {
            assert_eq!(env_parse("COMMON_TEST_NUM", 42u64), 42);
        });
        with_var("COMMON_TEST_NUM", Some(" 7 "), || {
            assert_eq!(env_parse("COMMON_TEST_NUM", 42u64), 7);
        });
    }

    #[test]
    #[serial]
    fn clamped_values_respect_bounds() {
        with_var("COMMON_TEST_NUM", Some("50"), || {
            assert_eq!(env_clamped("COMMON_TEST_NUM", 300u64, 100, 2000), 100);
        });
        with_var("COMMON_TEST_NUM", Some("9000"), || {
            assert_eq!(env_clamped("COMMON_TEST_NUM", 300u64, 100, 2000), 2000);
        });
        with_var("COMMON_TEST_NUM", Some("1.5"), || {
            assert_eq!(env_clamped("COMMON_TEST_NUM", 0.7f32, 0.0, 1.0), 1.0);
        });
    }

    #[test]
    #[serial]
    fn flags_accept_common_spellings() {
        with_var("COMMON_TEST_FLAG", Some("off"), || {
            assert!(!env_flag("COMMON_TEST_FLAG", true));
        });
        with_var("COMMON_TEST_FLAG", Some("Yes"), || {
            assert!(env_flag("COMMON_TEST_FLAG", false));
        });
        with_var("COMMON_TEST_FLAG", Some("maybe"), || {
            assert!(env_flag("COMMON_TEST_FLAG", true));
        });
    }

    #[test]
    #[serial]
    fn blank_strings_use_default() {
        with_var("COMMON_TEST_STR", Some("  "), || {
            assert_eq!(env_string("COMMON_TEST_STR", "kiosk"), "kiosk");
            assert_eq!(env_optional("COMMON_TEST_STR"), None);
        });
    }
}
