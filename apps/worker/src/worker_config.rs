use std::env;
use std::str::FromStr;
use std::time::Duration;

use lumora_application::OutpaintingWorkerConfig;
use lumora_core::{AppError, AppResult};
use lumora_infrastructure::{InferenceSettings, JobQueuePolicy};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: String,
    pub queue_key_prefix: String,
    pub queue_channel_pool_size: usize,
    pub queue_policy: JobQueuePolicy,
    pub worker: OutpaintingWorkerConfig,
    pub inference: InferenceSettings,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let value = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let database_url = required(value("DATABASE_URL"), "DATABASE_URL")?;
        let redis_url = value("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_owned());
        let worker_id = value("WORKER_ID")
            .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4().simple()));

        let stale_running_seconds: u64 = parse_or(
            value("WORKER_STALE_RUNNING_SECONDS"),
            "WORKER_STALE_RUNNING_SECONDS",
            15 * 60,
        )?;

        let worker = OutpaintingWorkerConfig {
            worker_id,
            concurrency: positive(value("WORKER_CONCURRENCY"), "WORKER_CONCURRENCY", 4)?,
            backlog: parse_or(value("WORKER_BACKLOG"), "WORKER_BACKLOG", 20)?,
            poll_interval: Duration::from_millis(positive(
                value("WORKER_POLL_INTERVAL_MS"),
                "WORKER_POLL_INTERVAL_MS",
                500,
            )?),
            stale_running_after: (stale_running_seconds > 0)
                .then(|| Duration::from_secs(stale_running_seconds)),
            sweep_interval: Duration::from_secs(positive(
                value("WORKER_SWEEP_INTERVAL_SECONDS"),
                "WORKER_SWEEP_INTERVAL_SECONDS",
                30,
            )?),
        };

        let defaults = InferenceSettings::default();
        let inference = InferenceSettings {
            base_url: value("INFERENCE_BASE_URL").unwrap_or(defaults.base_url),
            api_key: required(value("INFERENCE_API_KEY"), "INFERENCE_API_KEY")?,
            model: value("INFERENCE_MODEL").unwrap_or(defaults.model),
            max_tokens: positive(
                value("INFERENCE_MAX_TOKENS"),
                "INFERENCE_MAX_TOKENS",
                defaults.max_tokens,
            )?,
            timeout: Duration::from_secs(positive(
                value("INFERENCE_TIMEOUT_SECONDS"),
                "INFERENCE_TIMEOUT_SECONDS",
                defaults.timeout.as_secs(),
            )?),
            max_attempts: positive(
                value("INFERENCE_MAX_ATTEMPTS"),
                "INFERENCE_MAX_ATTEMPTS",
                defaults.max_attempts,
            )?,
            retry_delay: Duration::from_millis(parse_or(
                value("INFERENCE_RETRY_DELAY_MS"),
                "INFERENCE_RETRY_DELAY_MS",
                2000,
            )?),
        };

        Ok(Self {
            database_url,
            redis_url,
            queue_key_prefix: value("JOB_QUEUE_KEY_PREFIX")
                .unwrap_or_else(|| "lumora:outpainting".to_owned()),
            queue_channel_pool_size: positive(
                value("JOB_QUEUE_CHANNEL_POOL_SIZE"),
                "JOB_QUEUE_CHANNEL_POOL_SIZE",
                6,
            )?,
            queue_policy: JobQueuePolicy {
                message_ttl: Duration::from_secs(positive(
                    value("JOB_QUEUE_MESSAGE_TTL_SECONDS"),
                    "JOB_QUEUE_MESSAGE_TTL_SECONDS",
                    600,
                )?),
                max_deliveries: positive(
                    value("JOB_QUEUE_MAX_DELIVERIES"),
                    "JOB_QUEUE_MAX_DELIVERIES",
                    10,
                )?,
            },
            worker,
            inference,
        })
    }
}

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    value.ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value.parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn positive<T>(value: Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let parsed = parse_or(value, name, default)?;
    if parsed == T::default() {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use lumora_core::{AppError, AppResult};

    use super::WorkerConfig;

    fn load(pairs: &[(&str, &str)]) -> AppResult<WorkerConfig> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        WorkerConfig::from_lookup(|name| values.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/lumora"),
        ("INFERENCE_API_KEY", "sk-test"),
    ];

    #[test]
    fn defaults_fill_unset_values() {
        let Ok(config) = load(&REQUIRED) else {
            panic!("config should load");
        };

        assert!(config.worker.worker_id.starts_with("worker-"));
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.backlog, 20);
        assert_eq!(config.worker.poll_interval, Duration::from_millis(500));
        assert_eq!(config.worker.stale_running_after, Some(Duration::from_secs(900)));
        assert_eq!(config.inference.model, "baidu/ERNIE-4.5-300B-A47B");
        assert_eq!(config.inference.max_attempts, 3);
        assert_eq!(config.inference.retry_delay, Duration::from_millis(2000));
        assert_eq!(config.queue_policy.max_deliveries, 10);
        assert_eq!(config.queue_key_prefix, "lumora:outpainting");
    }

    #[test]
    fn zero_staleness_window_disables_reclaim() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WORKER_STALE_RUNNING_SECONDS", "0"));
        pairs.push(("WORKER_ID", "gpu-node-3"));

        let Ok(config) = load(&pairs) else {
            panic!("config should load");
        };

        assert_eq!(config.worker.stale_running_after, None);
        assert_eq!(config.worker.worker_id, "gpu-node-3");
    }

    #[test]
    fn inference_key_is_required() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/lumora")]);

        assert!(
            matches!(config, Err(AppError::Validation(message)) if message == "INFERENCE_API_KEY is required")
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WORKER_CONCURRENCY", "0"));

        assert!(matches!(load(&pairs), Err(AppError::Validation(_))));
    }
}
