// Platform-aware environment variable helpers.

use crate::constants::{CURRENT_PLATFORM, OsPlatform, PATH_SEPARATOR, PATH_VARIABLE};
use std::collections::HashMap;

/// Whether two environment variable names refer to the same variable on the
/// current platform. Windows compares case-insensitively; Unix does not.
pub fn env_var_keys_equal(a: &str, b: &str) -> bool {
    match CURRENT_PLATFORM {
        OsPlatform::Windows => a.eq_ignore_ascii_case(b),
        _ => a == b,
    }
}

/// Merge environment variable maps, with `overrides` winning over `base`.
///
/// Key comparison follows the platform rules from `env_var_keys_equal`.
pub fn merge_env(
    base: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        let existing = merged.keys().find(|k| env_var_keys_equal(k, key)).cloned();
        if let Some(k) = existing {
            merged.remove(&k);
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Prepend directories to the PATH entry of an environment map.
///
/// Falls back to the process PATH when the map has none. A no-op when
/// `prepend` is empty.
pub fn prepend_path(env: &mut HashMap<String, String>, prepend: &[String]) {
    if prepend.is_empty() {
        return;
    }

    let current = env
        .get(PATH_VARIABLE)
        .cloned()
        .or_else(|| std::env::var(PATH_VARIABLE).ok())
        .unwrap_or_default();

    let new_path = if current.is_empty() {
        prepend.join(PATH_SEPARATOR)
    } else {
        format!("{}{}{}", prepend.join(PATH_SEPARATOR), PATH_SEPARATOR, current)
    };
    env.insert(PATH_VARIABLE.to_string(), new_path);
}
