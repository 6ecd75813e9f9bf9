use std::sync::{Mutex, OnceLock};

/// Variables read by `Config::load`.
const CONFIG_ENV_VARS: [&str; 5] = [
    "COMPUTER_USE_SHELL",
    "COMPUTER_USE_TIMEOUT_SECS",
    "WIDTH",
    "HEIGHT",
    "DISPLAY_NUM",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Runs `run` with the environment locked and config overrides cleared.
///
/// Override variables are cleared again afterwards so a failing test does
/// not leak them into the next one.
pub(crate) fn with_locked_env<R>(run: impl FnOnce() -> R) -> R {
    let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
    clear_config_env();
    let result = run();
    clear_config_env();
    result
}

fn clear_config_env() {
    for key in CONFIG_ENV_VARS {
        remove_env_var(key);
    }
}

/// Set an environment variable in test contexts.
///
/// # Safety
/// `std::env::set_var` is unsafe on edition 2024. Call sites hold the
/// `with_locked_env` lock so parallel tests do not race.
pub(crate) fn set_env_var(key: &str, value: &str) {
    // SAFETY: serialized by `with_locked_env`.
    unsafe {
        std::env::set_var(key, value);
    }
}

/// Remove an environment variable in test contexts.
pub(crate) fn remove_env_var(key: &str) {
    // SAFETY: serialized by `with_locked_env`.
    unsafe {
        std::env::remove_var(key);
    }
}
