/// Width used when stdout is not a terminal and `COLUMNS` is unset.
const FALLBACK_COLUMNS: usize = 80;

/// Current terminal width in columns, unclamped.
pub fn columns() -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => columns_from_env(std::env::var("COLUMNS").ok().as_deref()),
    }
}

fn columns_from_env(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&c| c > 0)
        .unwrap_or(FALLBACK_COLUMNS)
}
