/// Device selection
pub mod device;

/// Supported pretrained encoders
pub mod models;

/// Initialize the logger from `RUST_LOG`, showing `info` and above when it is unset
pub fn init_logging() {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();
}
