use thiserror::Error;

const DEFAULT_THREADS: u16 = 4;
const DEFAULT_ITEMS: usize = 10_000;
const DEFAULT_TRANSACTIONS: usize = 100;
const DEFAULT_REFS: usize = 50;
const DEFAULT_LOG: &str = "info";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid number")]
    Invalid { var: &'static str, value: String },
    #[error("{var} must be at least {min}, got {value}")]
    OutOfRange { var: &'static str, value: u64, min: u64 },
}

/// Knobs for the stress workload. Everything comes from `OXIDLOCK_*` environment variables,
/// anything not set falls back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadConfig {
    pub n_threads: u16,
    pub n_items: usize,
    pub transactions_per_thread: usize,
    /// Upper bound on the number of items one transaction picks. The actual count is uniform in
    /// 1..=max_refs.
    pub max_refs: usize,
    /// Fixed seed for reproducible runs. Thread `i` uses `seed + i`.
    pub seed: Option<u64>,
    pub log_filter: String,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            n_threads: DEFAULT_THREADS,
            n_items: DEFAULT_ITEMS,
            transactions_per_thread: DEFAULT_TRANSACTIONS,
            max_refs: DEFAULT_REFS,
            seed: None,
            log_filter: DEFAULT_LOG.to_string(),
        }
    }
}

impl WorkloadConfig {
    pub fn from_env() -> Result<WorkloadConfig, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env` with a custom variable source, mostly so tests don't have to mess with
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<WorkloadConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = WorkloadConfig::default();
        let config = WorkloadConfig {
            n_threads: parse_or(&lookup, "OXIDLOCK_NTHREADS", defaults.n_threads)?,
            n_items: parse_or(&lookup, "OXIDLOCK_ITEMS", defaults.n_items)?,
            transactions_per_thread: parse_or(
                &lookup,
                "OXIDLOCK_TRANSACTIONS",
                defaults.transactions_per_thread,
            )?,
            max_refs: parse_or(&lookup, "OXIDLOCK_REFS", defaults.max_refs)?,
            seed: match lookup("OXIDLOCK_SEED") {
                Some(value) => Some(parse("OXIDLOCK_SEED", value)?),
                None => None,
            },
            log_filter: lookup("OXIDLOCK_LOG").unwrap_or(defaults.log_filter),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least("OXIDLOCK_NTHREADS", self.n_threads as u64, 1)?;
        at_least("OXIDLOCK_ITEMS", self.n_items as u64, 1)?;
        at_least("OXIDLOCK_REFS", self.max_refs as u64, 1)?;
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid { var, value })
}

fn parse_or<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => parse(var, value),
        None => Ok(default),
    }
}

fn at_least(var: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::OutOfRange { var, value, min });
    }
    Ok(())
}
