// src/utils/log.rs

//! Multi-line report helpers on top of the `log` facade.
//!
//! Used by the inspection commands; the watcher itself logs single lines.

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Render a duration as `1d 4h 12m`, or in seconds when under a minute.
pub fn humanize(duration: chrono::Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    if minutes == 0 {
        return format!("{}s", duration.num_seconds().max(0));
    }
    let (days, rem) = (minutes / (24 * 60), minutes % (24 * 60));
    let (hours, mins) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// [`humanize`] for a std duration.
pub fn humanize_std(duration: std::time::Duration) -> String {
    humanize(chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX))
}
