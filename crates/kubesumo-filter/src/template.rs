//! `%{name}` placeholder substitution for source host, name and category
//! templates.

use kubesumo_types::WorkloadMetadata;

const OPEN: &str = "%{";

/// Render `template` against workload metadata.
///
/// Placeholders naming an unknown or absent field are copied through
/// unchanged, as is an unterminated `%{`.
pub fn render(template: &str, meta: &WorkloadMetadata) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];

        let Some(end) = after_open.find('}') else {
            break;
        };

        let name = &after_open[..end];
        match meta.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + OPEN.len() + end + 1]),
        }
        rest = &after_open[end + 1..];
    }

    out.push_str(rest);
    out
}
