/// Format a baht amount for display.
/// Whole amounts drop the decimals ("฿59"), others keep two ("฿59.50").
pub fn format_thb(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("฿{}", amount as i64)
    } else {
        format!("฿{:.2}", amount)
    }
}

/// Truncate a string to a maximum number of characters, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
