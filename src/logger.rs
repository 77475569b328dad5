//! logger.rs
//! Logger global con env_logger.
//!
//! Nivel por `RUST_LOG`; sin variable se usa `info`. Ningún mensaje de log
//! recibe números de teléfono: el tipo `Phone` solo imprime una redacción.

pub fn init_logger() {
    let log_env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_env))
        .format_timestamp_millis()
        .init();
}
