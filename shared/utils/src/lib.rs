pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod response;
pub mod validation;

pub use cache::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use metrics::*;
pub use response::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_expires_minutes, 60);
        assert_eq!(config.auth.demo_username, "admin");
        assert_eq!(config.cache.default_ttl_seconds, 300);
        assert_eq!(config.database.backend, StorageBackend::Postgres);
    }

    #[test]
    fn test_error_handling() {
        let error = BauxiteError::validation("name is required");
        assert_eq!(error.error_code(), "VALIDATION_ERROR");
        assert_eq!(error.http_status_code(), 400);
    }
}
