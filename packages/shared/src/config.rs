use std::str::FromStr;
use std::time::Duration;

/// Rating tolerance that widens the longer a ticket waits.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingPolicy {
    pub initial_tolerance: i32,
    pub widen_step: i32,
    pub widen_interval: Duration,
    /// None lets the window grow without bound, so nobody waits forever for a partner.
    pub max_tolerance: Option<i32>,
}

impl PairingPolicy {
    pub fn tolerance_after(&self, waited: Duration) -> i32 {
        let steps = (waited.as_millis() / self.widen_interval.as_millis().max(1)) as i64;
        let widened = self.initial_tolerance as i64 + steps * self.widen_step as i64;
        let widened = widened.min(i32::MAX as i64) as i32;
        match self.max_tolerance {
            Some(max) => widened.min(max),
            None => widened,
        }
    }
}

impl Default for PairingPolicy {
    fn default() -> Self {
        PairingPolicy {
            initial_tolerance: 100,
            widen_step: 100,
            widen_interval: Duration::from_secs(10),
            max_tolerance: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuelConfig {
    pub bind_addr: String,
    pub log_level: String,
    pub judge_base_url: String,
    pub judge_timeout: Duration,
    pub duel_duration: Duration,
    pub start_grace: Duration,
    pub disconnect_grace: Duration,
    pub queue_max_wait: Duration,
    pub queue_tick: Duration,
    pub pairing: PairingPolicy,
    pub default_rating: i32,
    pub rating_k_factor: f64,
}

impl Default for DuelConfig {
    fn default() -> Self {
        DuelConfig {
            bind_addr: "0.0.0.0:3001".to_string(),
            log_level: "info".to_string(),
            judge_base_url: "http://localhost:8000".to_string(),
            judge_timeout: Duration::from_secs(15),
            duel_duration: Duration::from_secs(600),
            start_grace: Duration::from_secs(30),
            disconnect_grace: Duration::from_secs(30),
            queue_max_wait: Duration::from_secs(300),
            queue_tick: Duration::from_millis(1000),
            pairing: PairingPolicy::default(),
            default_rating: 1200,
            rating_k_factor: 32.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "Invalid value {:?} for {}: {}", value, key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl DuelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key/value source, falling back to defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DuelConfig::default();
        let config = DuelConfig {
            bind_addr: lookup("DUEL_BIND_ADDR").unwrap_or(defaults.bind_addr),
            log_level: lookup("DUEL_LOG_LEVEL").unwrap_or(defaults.log_level),
            judge_base_url: lookup("JUDGE_BASE_URL").unwrap_or(defaults.judge_base_url),
            judge_timeout: millis(&lookup, "JUDGE_TIMEOUT_MS", defaults.judge_timeout)?,
            duel_duration: secs(&lookup, "DUEL_DURATION_SECS", defaults.duel_duration)?,
            start_grace: secs(&lookup, "START_GRACE_SECS", defaults.start_grace)?,
            disconnect_grace: secs(&lookup, "DISCONNECT_GRACE_SECS", defaults.disconnect_grace)?,
            queue_max_wait: secs(&lookup, "QUEUE_MAX_WAIT_SECS", defaults.queue_max_wait)?,
            queue_tick: millis(&lookup, "QUEUE_TICK_MS", defaults.queue_tick)?,
            pairing: PairingPolicy {
                initial_tolerance: parse(
                    &lookup,
                    "PAIRING_INITIAL_TOLERANCE",
                    defaults.pairing.initial_tolerance,
                )?,
                widen_step: parse(&lookup, "PAIRING_WIDEN_STEP", defaults.pairing.widen_step)?,
                widen_interval: secs(
                    &lookup,
                    "PAIRING_WIDEN_INTERVAL_SECS",
                    defaults.pairing.widen_interval,
                )?,
                max_tolerance: match lookup("PAIRING_MAX_TOLERANCE") {
                    Some(value) => Some(parse_value("PAIRING_MAX_TOLERANCE", &value)?),
                    None => defaults.pairing.max_tolerance,
                },
            },
            default_rating: parse(&lookup, "DEFAULT_RATING", defaults.default_rating)?,
            rating_k_factor: parse(&lookup, "RATING_K_FACTOR", defaults.rating_k_factor)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("JUDGE_TIMEOUT_MS", self.judge_timeout),
            ("DUEL_DURATION_SECS", self.duel_duration),
            ("DISCONNECT_GRACE_SECS", self.disconnect_grace),
            ("QUEUE_MAX_WAIT_SECS", self.queue_max_wait),
            ("QUEUE_TICK_MS", self.queue_tick),
            ("PAIRING_WIDEN_INTERVAL_SECS", self.pairing.widen_interval),
        ];
        for (key, value) in positive {
            if value.is_zero() {
                return Err(invalid(key, "0", "must be greater than zero"));
            }
        }
        if self.pairing.initial_tolerance < 0 || self.pairing.widen_step < 0 {
            return Err(invalid(
                "PAIRING_INITIAL_TOLERANCE",
                &self.pairing.initial_tolerance.to_string(),
                "tolerances cannot be negative",
            ));
        }
        if self.rating_k_factor < 0.0 {
            return Err(invalid(
                "RATING_K_FACTOR",
                &self.rating_k_factor.to_string(),
                "cannot be negative",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse(lookup, key, default.as_millis() as u64).map(Duration::from_millis)
}
