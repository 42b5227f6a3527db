use std::env;
use std::fmt;
use std::string::String;

use aws_config::SdkConfig;
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use thiserror::Error;

pub const ENDPOINT_VAR: &str = "INFLUXDB_URL";
pub const DATABASE_VAR: &str = "INFLUXDB_DATABASE";
pub const USERNAME_VAR: &str = "INFLUXDB_USERNAME";
pub const PASSWORD_VAR: &str = "INFLUXDB_PASSWORD";
pub const REQUEST_TIMEOUT_VAR: &str = "INFLUXDB_REQUEST_TIMEOUT";

const SECRET_ARN_PREFIX: &str = "arn:aws:secretsmanager:";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {name} - {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Connection settings for the time-series sink, loaded once at start-up.
#[derive(Clone, PartialEq)]
pub struct Config {
    pub endpoint: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub request_timeout: u64,
}

impl Config {
    pub fn load_from_env() -> Result<Config, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |name: &'static str| match env::var(name) {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => {
                missing.push(name);
                String::new()
            }
        };

        let endpoint = required(ENDPOINT_VAR);
        let database = required(DATABASE_VAR);
        let username = required(USERNAME_VAR);
        let password = required(PASSWORD_VAR);

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let request_timeout = env::var(REQUEST_TIMEOUT_VAR)
            .unwrap_or("30".to_string())
            .parse::<u64>()
            .map_err(|e| ConfigError::Invalid {
                name: REQUEST_TIMEOUT_VAR,
                reason: format!("error parsing to u64 - {}", e),
            })?;
        if request_timeout == 0 {
            return Err(ConfigError::Invalid {
                name: REQUEST_TIMEOUT_VAR,
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(Config {
            endpoint,
            database,
            username,
            password,
            request_timeout,
        })
    }

    /// True when the password is a Secrets Manager ARN rather than the secret itself.
    pub fn password_is_secret_arn(&self) -> bool {
        self.password.starts_with(SECRET_ARN_PREFIX)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum KeySourceError {
    #[error("Failed to access AWS Secrets Manager. Please make sure the lambda function has permissions to access the {secret_id} secret. Error: {error:?}")]
    FailedToAccessSecretsManager {
        secret_id: String,
        error: GetSecretValueError,
    },
    #[error("Didn't find the {secret_id} secret in AWS secretsmanager")]
    MissingSecret { secret_id: String },
}

pub async fn get_password_from_secrets_manager(
    aws_config: &SdkConfig,
    secret_id: String,
) -> Result<String, KeySourceError> {
    let secretsmanager = aws_sdk_secretsmanager::Client::new(aws_config);
    let response = secretsmanager
        .get_secret_value()
        .set_secret_id(Some(secret_id.clone()))
        .send()
        .await
        .map_err(|error| KeySourceError::FailedToAccessSecretsManager {
            secret_id: secret_id.clone(),
            error: error.into_service_error(),
        })?;
    response
        .secret_string
        .ok_or(KeySourceError::MissingSecret { secret_id })
}
