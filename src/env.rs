use std::env;

use log::warn;
use typerace_server::DEFAULT_PORT;

const PORT_VARIABLE: &str = "TYPERACE_SERVER_PORT";
const DATABASE_URL_VARIABLE: &str = "TYPERACE_DATABASE_URL";

/// Process configuration read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    pub port: u16,
    /// Postgres is used when set, otherwise everything is kept in memory
    pub database_url: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_values(
            env::var(PORT_VARIABLE).ok(),
            env::var(DATABASE_URL_VARIABLE).ok(),
        )
    }

    fn from_values(port: Option<String>, database_url: Option<String>) -> Self {
        let port = match port.map(|p| p.trim().parse::<u16>()) {
            Some(Ok(port)) => port,
            Some(Err(_)) => {
                warn!("{} must be a port number, using {}", PORT_VARIABLE, DEFAULT_PORT);
                DEFAULT_PORT
            }
            None => DEFAULT_PORT,
        };

        Self {
            port,
            database_url: database_url.filter(|url| !url.trim().is_empty()),
        }
    }
}
