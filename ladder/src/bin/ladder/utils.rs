use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// Format a DateTime to a human-readable string
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Expand every `${VAR}` reference in `value` from the process environment.
///
/// An unterminated `${` is kept as literal text.
pub fn expand_env_vars(value: &str) -> Result<String> {
    let mut expanded = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + 2 + len];
        let var_value = std::env::var(var_name)
            .with_context(|| format!("Environment variable {var_name} not set"))?;

        expanded.push_str(&rest[..start]);
        expanded.push_str(&var_value);
        rest = &rest[start + 3 + len..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}
