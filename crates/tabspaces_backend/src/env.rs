use anyhow::anyhow;
use std::path::PathBuf;
use std::time::Duration;

pub fn optional_trimmed_path_from_env(name: &str) -> anyhow::Result<Option<PathBuf>> {
    let value = match std::env::var_os(name) {
        Some(value) => value,
        None => return Ok(None),
    };

    let value = value.to_string_lossy();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{name} is set but empty"));
    }

    Ok(Some(PathBuf::from(trimmed)))
}

/// Reads a millisecond duration. Unset, empty or unparsable values fall back
/// to `default`; the latter two are logged.
pub fn duration_ms_from_env(name: &str, default: Duration) -> Duration {
    let Some(value) = std::env::var_os(name) else {
        return default;
    };
    let value = value.to_string_lossy();
    match value.trim().parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(err) => {
            tracing::warn!(name, value = %value, error = %err, "invalid duration, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{duration_ms_from_env, optional_trimmed_path_from_env};
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::time::Duration;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    fn with_env<T>(name: &str, value: Option<&str>, f: impl FnOnce() -> T) -> T {
        let _guard = lock_env();
        let prev = std::env::var_os(name);
        unsafe {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
        let out = f();
        unsafe {
            match prev {
                Some(prev) => std::env::set_var(name, prev),
                None => std::env::remove_var(name),
            }
        }
        out
    }

    #[test]
    fn optional_trimmed_path_from_env_returns_none_when_unset() {
        let loaded = with_env("TABSPACES_TEST_PATH_ENV", None, || {
            optional_trimmed_path_from_env("TABSPACES_TEST_PATH_ENV")
        })
        .expect("unset env should not error");
        assert!(loaded.is_none());
    }

    #[test]
    fn optional_trimmed_path_from_env_errors_on_empty() {
        let err = with_env("TABSPACES_TEST_PATH_ENV", Some("   "), || {
            optional_trimmed_path_from_env("TABSPACES_TEST_PATH_ENV")
        })
        .expect_err("empty env should error");
        assert!(
            err.to_string()
                .contains("TABSPACES_TEST_PATH_ENV is set but empty"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn optional_trimmed_path_from_env_trims_value() {
        let loaded = with_env("TABSPACES_TEST_PATH_ENV", Some(" tabspaces-test "), || {
            optional_trimmed_path_from_env("TABSPACES_TEST_PATH_ENV")
        })
        .expect("non-empty env should succeed");
        assert_eq!(loaded, Some(PathBuf::from("tabspaces-test")));
    }

    #[test]
    fn duration_falls_back_on_garbage() {
        let fallback = Duration::from_millis(250);
        let parsed = with_env("TABSPACES_TEST_MS_ENV", Some(" 40 "), || {
            duration_ms_from_env("TABSPACES_TEST_MS_ENV", fallback)
        });
        assert_eq!(parsed, Duration::from_millis(40));

        let garbage = with_env("TABSPACES_TEST_MS_ENV", Some("soon"), || {
            duration_ms_from_env("TABSPACES_TEST_MS_ENV", fallback)
        });
        assert_eq!(garbage, fallback);
    }
}
