//! Environment variable helpers.

/// Get an environment variable, treating empty values as unset.
pub fn env_opt(key: &str) -> Option<String> {
    non_empty(std::env::var(key).ok())
}

/// First set variable among `keys`, looked up through `lookup`.
pub fn first_of<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| non_empty(lookup(key)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
