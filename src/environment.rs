use std::collections::HashMap;

/// Read-only key/value lookup over environment variables.
///
/// Every resolver receives one of these instead of touching the process
/// environment directly, so tests can supply a plain map.
pub trait Environment: Send + Sync {
    /// Raw lookup: `Some` if the variable is set, even when empty
    fn get(&self, key: &str) -> Option<String>;

    /// Lookup that treats empty values as unset
    fn non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Interpret a variable as a boolean flag (`1`, `t`, `true`, `0`, `f`, `false`, ...).
    ///
    /// Unparseable or missing values are `false`.
    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| parse_bool(&v).unwrap_or(false))
    }
}

/// The environment of the running process
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn env_from(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
