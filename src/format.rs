//! Human-readable labels and number rendering for dashboard text.

/// Map a column identifier to a display label: `"duration_min"` → `"Duration"`,
/// `"general_genre"` → `"General Genre"`.
pub fn format_label(label: &str) -> String {
    if label == "duration_min" {
        return "Duration".to_string();
    }
    label
        .split('_')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First character upper-cased, the rest lower-cased.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render a float the way dashboard text shows it: shortest representation,
/// but always with a fractional part (`10.0`, `12.35`, `-100.0`).
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
