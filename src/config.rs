use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Odontogram";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable that overrides the chart database location.
pub const CHART_DB_ENV: &str = "ODONTOGRAM_DB";

/// Get the application data directory
/// ~/Odontogram/ on all platforms, falling back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(APP_NAME),
        None => {
            tracing::warn!("Cannot determine home directory, using working directory");
            PathBuf::from(APP_NAME)
        }
    }
}

/// Get the chart database path
pub fn chart_db_path() -> PathBuf {
    std::env::var_os(CHART_DB_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| app_data_dir().join("chart.db"))
}

/// Tracing filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "odontogram_lib=debug,warn"
    } else {
        "odontogram_lib=info,warn"
    }
}
