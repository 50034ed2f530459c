//! Prometheus metric and label naming.

/// Build a fully-qualified metric name from its components.
///
/// Format: `{namespace}_{subsystem}_{name}`. Empty components are skipped,
/// so `build_fq_name("", "gpu", "duty_cycle")` yields `gpu_duty_cycle`.
/// An empty `name` yields an empty string.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Check that a metric name matches `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Check that a label name matches `[a-zA-Z_][a-zA-Z0-9_]*` and is not
/// reserved (labels starting with `__` are for internal use).
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
