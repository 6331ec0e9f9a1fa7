//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration before any connection is attempted.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.host.is_empty() {
        return Err(MigrateError::Config(
            "please specify a valid server address and port for the source database".into(),
        ));
    }
    if config.source.resolved_port() == 0 {
        return Err(MigrateError::Config(
            "please specify a valid server address and port for the source database".into(),
        ));
    }
    if config.destination.host.is_empty() {
        return Err(MigrateError::Config(
            "please specify a valid server address and port for the destination database".into(),
        ));
    }

    if config.source.kind.is_sql() && config.source.database.is_empty() {
        return Err(MigrateError::Config(format!(
            "please specify a {} database name",
            config.source.kind
        )));
    }

    // Endpoints are compared literally; 'localhost' and '127.0.0.1' are
    // treated as different hosts.
    if endpoints_match(
        &config.source.host,
        config.source.resolved_port(),
        &config.destination.host,
        config.destination.port,
    ) {
        return Err(MigrateError::Config(
            "the source and destination endpoints match; use two different endpoints".into(),
        ));
    }

    Ok(())
}

/// Compare two endpoints as literal host/port pairs.
fn endpoints_match(host1: &str, port1: u16, host2: &str, port2: u16) -> bool {
    host1 == host2 && port1 == port2
}
