use std::{env, net::SocketAddr};

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentMode {
    Development,
    #[default]
    Production,
    Test,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub mode: DeploymentMode,
    pub json_response: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("ENVIRONMENT must be one of: development, production, test")]
    InvalidEnvironment,
    #[error("MCP_JSON_RESPONSE must be a boolean")]
    InvalidJsonResponse,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl DeploymentMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            _ => Err(ConfigError::InvalidEnvironment),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("BIND_ADDR")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_port = env::var("PORT")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);
        let mode = env::var("ENVIRONMENT")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| DeploymentMode::parse(&value))
            .transpose()?
            .unwrap_or_default();
        let json_response = env::var("MCP_JSON_RESPONSE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| parse_bool(&value).ok_or(ConfigError::InvalidJsonResponse))
            .transpose()?
            .unwrap_or(false);

        let config = Self {
            bind_addr,
            bind_port,
            mode,
            json_response,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
