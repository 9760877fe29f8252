//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_query, LogFormat, LoggingConfig,
};

#[test]
fn test_double_initialization_is_an_error() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_filter("core_cache=warn");

    // Only one global subscriber per process; the second call must not panic.
    let first = init_logging(config.clone());
    let second = init_logging(config);

    assert!(first.is_ok());
    assert!(matches!(second, Err(core_runtime::Error::Config(_))));
}

#[test]
fn test_credentials_redacted() {
    assert_eq!(redact_if_sensitive("authorization", "Bearer abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("cookie", "sid=1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("refresh_token", "r"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "p"), "[REDACTED]");
}

#[test]
fn test_urls_lose_query_string() {
    assert_eq!(
        redact_if_sensitive("url", "https://cdn.test/a.mp3?Expires=1&Signature=x"),
        "https://cdn.test/a.mp3"
    );
    assert_eq!(strip_query("https://cdn.test/a.mp3"), "https://cdn.test/a.mp3");
    assert_eq!(strip_query("https://cdn.test/a.mp3#t=10"), "https://cdn.test/a.mp3");
    assert_eq!(strip_query(""), "");
}

#[test]
fn test_normal_values_pass_through() {
    assert_eq!(redact_if_sensitive("resource_id", "song1"), "song1");
    assert_eq!(redact_if_sensitive("bytes", "4096"), "4096");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
