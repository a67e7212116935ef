//! Strip generated replica suffixes from pod names.
//!
//! Deployments name pods `<name>-<template hash>-<pod hash>`, while other
//! controllers only append a single `-<suffix>`.

/// Normalize a pod name to its workload name.
///
/// Drops the last two `-` segments when the second-to-last looks numeric,
/// otherwise only the last one. Always keeps the first segment, so a name
/// without dashes comes back unchanged.
pub fn normalize(pod: &str) -> String {
    let parts: Vec<&str> = pod.split('-').collect();
    let n = parts.len();
    if n < 2 {
        return pod.to_string();
    }

    let strip = if n > 2 && looks_numeric(parts[n - 2]) { 2 } else { 1 };
    parts[..n - strip].join("-")
}

/// Numeric or hex-hash looking segment, e.g. `1234567890` or `7d4b9c7c99`
fn looks_numeric(segment: &str) -> bool {
    if !segment.bytes().any(|b| b.is_ascii_digit()) {
        return false;
    }
    segment.parse::<f64>().is_ok() || segment.bytes().all(|b| b.is_ascii_hexdigit())
}
