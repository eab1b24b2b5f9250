use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use lumora_application::RoleWriterConfig;
use lumora_core::AppError;
use lumora_infrastructure::JobQueuePolicy;
use tracing_subscriber::EnvFilter;

const MIN_INTERNAL_SECRET_LENGTH: usize = 32;

/// Redis job queue connection settings.
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    pub key_prefix: String,
    pub channel_pool_size: usize,
    pub policy: JobQueuePolicy,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub redis_url: String,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub cookie_secure: bool,
    pub internal_shared_secret: String,
    pub job_queue: JobQueueConfig,
    pub role_writer: RoleWriterConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        Self::from_lookup(env::args().nth(1).as_deref(), |name| env::var(name).ok())
    }

    fn from_lookup(
        command: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let env = EnvReader { lookup };

        let database_url = env.required_non_empty("DATABASE_URL")?;
        let redis_url = env.or_default("REDIS_URL", "redis://127.0.0.1:6379");
        let frontend_url = env.or_default("FRONTEND_URL", "http://localhost:3000");
        let api_host = env.or_default("API_HOST", "127.0.0.1");
        let api_port = env.parse_or("API_PORT", 3001_u16)?;
        let cookie_secure = env
            .or_default("SESSION_COOKIE_SECURE", "false")
            .eq_ignore_ascii_case("true");

        let internal_shared_secret = env.required_non_empty("INTERNAL_SHARED_SECRET")?;
        if internal_shared_secret.len() < MIN_INTERNAL_SECRET_LENGTH {
            return Err(AppError::Validation(format!(
                "INTERNAL_SHARED_SECRET must be at least {MIN_INTERNAL_SECRET_LENGTH} characters"
            )));
        }

        let job_queue = JobQueueConfig {
            key_prefix: env.or_default("JOB_QUEUE_KEY_PREFIX", "lumora:outpainting"),
            channel_pool_size: env.positive("JOB_QUEUE_CHANNEL_POOL_SIZE", 6)?,
            policy: JobQueuePolicy {
                message_ttl: Duration::from_secs(
                    env.positive("JOB_QUEUE_MESSAGE_TTL_SECONDS", 600)?,
                ),
                max_deliveries: env.positive("JOB_QUEUE_MAX_DELIVERIES", 10)?,
            },
        };

        let role_writer = RoleWriterConfig {
            batch_size: env.positive("ROLE_WRITER_BATCH_SIZE", 50)?,
            flush_interval: Duration::from_millis(
                env.positive("ROLE_WRITER_FLUSH_INTERVAL_MS", 100)?,
            ),
            queue_capacity: env.positive("ROLE_WRITER_QUEUE_CAPACITY", 1000)?,
            pool_size: env.positive("ROLE_WRITER_POOL_SIZE", 100)?,
        };

        Ok(Self {
            migrate_only: command == Some("migrate"),
            database_url,
            redis_url,
            frontend_url,
            api_host,
            api_port,
            cookie_secure,
            internal_shared_secret,
            job_queue,
            role_writer,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required_non_empty(&self, name: &str) -> Result<String, AppError> {
        let value =
            (self.lookup)(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{name} must not be empty")));
        }

        Ok(value)
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(name) {
            Some(value) => value.trim().parse::<T>().map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            }),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, name: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        let value = self.parse_or(name, default)?;
        if value == T::default() {
            return Err(AppError::Validation(format!(
                "{name} must be greater than zero"
            )));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use lumora_core::AppError;

    use super::ApiConfig;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(command: Option<&str>, pairs: &[(&str, &str)]) -> Result<ApiConfig, AppError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ApiConfig::from_lookup(command, |name| values.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let Ok(config) = load(
            None,
            &[
                ("DATABASE_URL", "postgres://localhost/lumora"),
                ("INTERNAL_SHARED_SECRET", SECRET),
            ],
        ) else {
            panic!("config should load");
        };

        assert!(!config.migrate_only);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.api_port, 3001);
        assert_eq!(config.job_queue.key_prefix, "lumora:outpainting");
        assert_eq!(config.job_queue.channel_pool_size, 6);
        assert_eq!(config.job_queue.policy.message_ttl, Duration::from_secs(600));
        assert_eq!(config.job_queue.policy.max_deliveries, 10);
        assert_eq!(config.role_writer.batch_size, 50);
        assert_eq!(config.role_writer.flush_interval, Duration::from_millis(100));
        assert_eq!(
            config.socket_address().map(|address| address.to_string()).ok(),
            Some("127.0.0.1:3001".to_owned())
        );
    }

    #[test]
    fn migrate_command_is_detected() {
        let config = load(
            Some("migrate"),
            &[
                ("DATABASE_URL", "postgres://localhost/lumora"),
                ("INTERNAL_SHARED_SECRET", SECRET),
            ],
        );

        assert!(config.is_ok_and(|config| config.migrate_only));
    }

    #[test]
    fn short_internal_secret_is_rejected() {
        let config = load(
            None,
            &[
                ("DATABASE_URL", "postgres://localhost/lumora"),
                ("INTERNAL_SHARED_SECRET", "too-short"),
            ],
        );

        assert!(matches!(config, Err(AppError::Validation(_))));
    }

    #[test]
    fn zero_and_malformed_numbers_are_rejected() {
        let zero = load(
            None,
            &[
                ("DATABASE_URL", "postgres://localhost/lumora"),
                ("INTERNAL_SHARED_SECRET", SECRET),
                ("JOB_QUEUE_MAX_DELIVERIES", "0"),
            ],
        );
        let malformed = load(
            None,
            &[
                ("DATABASE_URL", "postgres://localhost/lumora"),
                ("INTERNAL_SHARED_SECRET", SECRET),
                ("ROLE_WRITER_BATCH_SIZE", "many"),
            ],
        );

        assert!(matches!(zero, Err(AppError::Validation(_))));
        assert!(matches!(malformed, Err(AppError::Validation(_))));
    }

    #[test]
    fn missing_database_url_is_reported() {
        let config = load(None, &[("INTERNAL_SHARED_SECRET", SECRET)]);

        assert!(
            matches!(config, Err(AppError::Validation(message)) if message == "DATABASE_URL is required")
        );
    }
}
