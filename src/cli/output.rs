//! Output helpers for consistent CLI formatting

use console::style;

/// Display a success step with detail
pub fn step_ok_detail(message: &str, detail: &str) {
    println!("  {} {} ({})", style("[OK]").green(), message, style(detail).dim());
}

/// Display a warning step with a hint underneath
pub fn step_warn_hint(message: &str, hint: &str) {
    println!("  {} {}", style("[WARN]").yellow(), message);
    println!("       {}", style(hint).dim());
}

/// Display a key/value line
pub fn kv(key: &str, value: &str) {
    println!("  {:<10} {}", style(key).bold(), value);
}
