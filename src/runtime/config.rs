use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PACING_MIN_MS: u64 = 2_000;
pub const DEFAULT_PACING_MAX_MS: u64 = 3_000;
pub const DEFAULT_REMEDIATION_COOLDOWN_MS: u64 = 3_000;
const DEFAULT_QUEUE_WAIT_SECS: u64 = 2;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TABLE_KEY: &str = "id";
const DEFAULT_SCAN_UTC_OFFSET_HOURS: i32 = 9;

pub const ENV_GATEWAY_URL: &str = "RELIST_GATEWAY_URL";
pub const ENV_GATEWAY_USER: &str = "RELIST_GATEWAY_USER";
pub const ENV_GATEWAY_PASSWORD: &str = "RELIST_GATEWAY_PASSWORD";
pub const ENV_TABLE_NAME: &str = "RELIST_TABLE_NAME";
pub const ENV_TABLE_KEY: &str = "RELIST_TABLE_KEY";
pub const ENV_WORK_SOURCE: &str = "RELIST_WORK_SOURCE";
pub const ENV_QUEUE_URL: &str = "RELIST_QUEUE_URL";
pub const ENV_NEXT_ITEM_FUNCTION: &str = "RELIST_NEXT_ITEM_FUNCTION";
pub const ENV_FETCHER_FUNCTIONS: &str = "RELIST_FETCHER_FUNCTIONS";
pub const ENV_DELIST_FUNCTION: &str = "RELIST_DELIST_FUNCTION";
pub const ENV_LIST_FUNCTION: &str = "RELIST_LIST_FUNCTION";
pub const ENV_OFFER_FUNCTION: &str = "RELIST_OFFER_FUNCTION";
pub const ENV_ELIGIBILITY_FUNCTION: &str = "RELIST_ELIGIBILITY_FUNCTION";
pub const ENV_SOLD_LOOKUP_FUNCTION: &str = "RELIST_SOLD_LOOKUP_FUNCTION";
pub const ENV_PACING_MIN_MS: &str = "RELIST_PACING_MIN_MS";
pub const ENV_PACING_MAX_MS: &str = "RELIST_PACING_MAX_MS";
pub const ENV_REMEDIATION_COOLDOWN_MS: &str = "RELIST_REMEDIATION_COOLDOWN_MS";
pub const ENV_QUEUE_WAIT_SECS: &str = "RELIST_QUEUE_WAIT_SECS";
pub const ENV_RPC_TIMEOUT_SECS: &str = "RELIST_RPC_TIMEOUT_SECS";
pub const ENV_METRICS_INTERVAL_SECS: &str = "RELIST_METRICS_INTERVAL_SECS";
pub const ENV_SCAN_UTC_OFFSET_HOURS: &str = "RELIST_SCAN_UTC_OFFSET_HOURS";
pub const ENV_MAX_ITERATIONS: &str = "RELIST_MAX_ITERATIONS";

/// Where the loop obtains its next candidate item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkSourceKind {
    /// Drain one message at a time from a queue.
    Queue { queue_url: String },
    /// Ask a stateful remote function for the next item.
    Pull { function: String },
}

/// Runtime configuration for the reconciliation worker.
///
/// All instances must be constructed via [`ReconcilerConfig::builder`],
/// [`ReconcilerConfig::new`], or [`ReconcilerConfig::from_env`] so invariants
/// are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    gateway_url: String,
    gateway_user: String,
    gateway_password: String,
    table_name: String,
    table_key: String,
    work_source: WorkSourceKind,
    fetcher_functions: Vec<String>,
    delist_function: String,
    list_function: String,
    offer_function: String,
    eligibility_function: String,
    sold_lookup_function: String,
    pacing_min: Duration,
    pacing_max: Duration,
    remediation_cooldown: Duration,
    queue_wait: Duration,
    rpc_timeout: Duration,
    metrics_interval: Duration,
    scan_utc_offset: FixedOffset,
    max_iterations: Option<u64>,
}

pub struct ReconcilerConfigParams {
    pub gateway_url: String,
    pub gateway_user: String,
    pub gateway_password: String,
    pub table_name: String,
    pub table_key: String,
    pub work_source: WorkSourceKind,
    pub fetcher_functions: Vec<String>,
    pub delist_function: String,
    pub list_function: String,
    pub offer_function: String,
    pub eligibility_function: String,
    pub sold_lookup_function: String,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    pub remediation_cooldown: Duration,
    pub queue_wait: Duration,
    pub rpc_timeout: Duration,
    pub metrics_interval: Duration,
    pub scan_utc_offset: FixedOffset,
    pub max_iterations: Option<u64>,
}

impl ReconcilerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: ReconcilerConfigParams) -> Result<Self> {
        let ReconcilerConfigParams {
            gateway_url,
            gateway_user,
            gateway_password,
            table_name,
            table_key,
            work_source,
            fetcher_functions,
            delist_function,
            list_function,
            offer_function,
            eligibility_function,
            sold_lookup_function,
            pacing_min,
            pacing_max,
            remediation_cooldown,
            queue_wait,
            rpc_timeout,
            metrics_interval,
            scan_utc_offset,
            max_iterations,
        } = params;

        let work_source = match work_source {
            WorkSourceKind::Queue { queue_url } => WorkSourceKind::Queue {
                queue_url: trimmed_string(queue_url),
            },
            WorkSourceKind::Pull { function } => WorkSourceKind::Pull {
                function: trimmed_string(function),
            },
        };

        let config = Self {
            gateway_url: trimmed_string(gateway_url),
            gateway_user: trimmed_string(gateway_user),
            gateway_password: trimmed_string(gateway_password),
            table_name: trimmed_string(table_name),
            table_key: trimmed_string(table_key),
            work_source,
            fetcher_functions: fetcher_functions
                .into_iter()
                .map(trimmed_string)
                .filter(|name| !name.is_empty())
                .collect(),
            delist_function: trimmed_string(delist_function),
            list_function: trimmed_string(list_function),
            offer_function: trimmed_string(offer_function),
            eligibility_function: trimmed_string(eligibility_function),
            sold_lookup_function: trimmed_string(sold_lookup_function),
            pacing_min,
            pacing_max,
            remediation_cooldown,
            queue_wait,
            rpc_timeout,
            metrics_interval,
            scan_utc_offset,
            max_iterations,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads every `RELIST_*` variable from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Blank values count
    /// as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &str| read(key).with_context(|| format!("{key} must be set"));

        let work_source = match read(ENV_WORK_SOURCE).as_deref().unwrap_or("queue") {
            "queue" => WorkSourceKind::Queue {
                queue_url: require(ENV_QUEUE_URL)?,
            },
            "pull" => WorkSourceKind::Pull {
                function: require(ENV_NEXT_ITEM_FUNCTION)?,
            },
            other => bail!("{ENV_WORK_SOURCE} must be `queue` or `pull`, got `{other}`"),
        };

        let mut builder = ReconcilerConfig::builder()
            .gateway_url(require(ENV_GATEWAY_URL)?)
            .gateway_credentials(
                read(ENV_GATEWAY_USER).unwrap_or_default(),
                read(ENV_GATEWAY_PASSWORD).unwrap_or_default(),
            )
            .table_name(require(ENV_TABLE_NAME)?)
            .work_source(work_source)
            .fetcher_functions(split_list(&require(ENV_FETCHER_FUNCTIONS)?))
            .delist_function(require(ENV_DELIST_FUNCTION)?)
            .list_function(require(ENV_LIST_FUNCTION)?)
            .offer_function(require(ENV_OFFER_FUNCTION)?)
            .eligibility_function(require(ENV_ELIGIBILITY_FUNCTION)?)
            .sold_lookup_function(require(ENV_SOLD_LOOKUP_FUNCTION)?);

        if let Some(key) = read(ENV_TABLE_KEY) {
            builder = builder.table_key(key);
        }
        if let Some(ms) = parse_optional::<u64>(read(ENV_PACING_MIN_MS), ENV_PACING_MIN_MS)? {
            builder = builder.pacing_min(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_optional::<u64>(read(ENV_PACING_MAX_MS), ENV_PACING_MAX_MS)? {
            builder = builder.pacing_max(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_optional::<u64>(
            read(ENV_REMEDIATION_COOLDOWN_MS),
            ENV_REMEDIATION_COOLDOWN_MS,
        )? {
            builder = builder.remediation_cooldown(Duration::from_millis(ms));
        }
        if let Some(secs) = parse_optional::<u64>(read(ENV_QUEUE_WAIT_SECS), ENV_QUEUE_WAIT_SECS)? {
            builder = builder.queue_wait(Duration::from_secs(secs));
        }
        if let Some(secs) =
            parse_optional::<u64>(read(ENV_RPC_TIMEOUT_SECS), ENV_RPC_TIMEOUT_SECS)?
        {
            builder = builder.rpc_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) =
            parse_optional::<u64>(read(ENV_METRICS_INTERVAL_SECS), ENV_METRICS_INTERVAL_SECS)?
        {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }
        if let Some(hours) =
            parse_optional::<i32>(read(ENV_SCAN_UTC_OFFSET_HOURS), ENV_SCAN_UTC_OFFSET_HOURS)?
        {
            builder = builder.scan_utc_offset(offset_from_hours(hours)?);
        }
        if let Some(limit) = parse_optional::<u64>(read(ENV_MAX_ITERATIONS), ENV_MAX_ITERATIONS)? {
            builder = builder.max_iterations(limit);
        }

        builder.build()
    }

    /// Gateway endpoint (including scheme).
    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn gateway_user(&self) -> &str {
        &self.gateway_user
    }

    pub fn gateway_password(&self) -> &str {
        &self.gateway_password
    }

    /// Item store table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Key attribute of the item store table.
    pub fn table_key(&self) -> &str {
        &self.table_key
    }

    pub fn work_source(&self) -> &WorkSourceKind {
        &self.work_source
    }

    /// Equivalent upstream fetchers in rotation order.
    pub fn fetcher_functions(&self) -> &[String] {
        &self.fetcher_functions
    }

    pub fn delist_function(&self) -> &str {
        &self.delist_function
    }

    pub fn list_function(&self) -> &str {
        &self.list_function
    }

    pub fn offer_function(&self) -> &str {
        &self.offer_function
    }

    pub fn eligibility_function(&self) -> &str {
        &self.eligibility_function
    }

    pub fn sold_lookup_function(&self) -> &str {
        &self.sold_lookup_function
    }

    /// Lower bound of the randomized gap between upstream fetches.
    pub fn pacing_min(&self) -> Duration {
        self.pacing_min
    }

    /// Upper bound of the randomized gap between upstream fetches.
    pub fn pacing_max(&self) -> Duration {
        self.pacing_max
    }

    /// Pause after remediating a failing fetcher.
    pub fn remediation_cooldown(&self) -> Duration {
        self.remediation_cooldown
    }

    /// Bounded wait used when polling the queue, in whole seconds.
    pub fn queue_wait(&self) -> Duration {
        self.queue_wait
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Fixed offset used to render `scannedAt`.
    pub fn scan_utc_offset(&self) -> FixedOffset {
        self.scan_utc_offset
    }

    /// Optional cap on loop iterations; `None` runs until shutdown.
    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.gateway_url)?;
        ensure_not_empty(&self.table_name, "table_name")?;
        ensure_not_empty(&self.table_key, "table_key")?;

        match &self.work_source {
            WorkSourceKind::Queue { queue_url } => ensure_not_empty(queue_url, "queue_url")?,
            WorkSourceKind::Pull { function } => {
                ensure_not_empty(function, "next_item_function")?
            }
        }

        if self.fetcher_functions.is_empty() {
            bail!("fetcher_functions must name at least one fetcher");
        }

        ensure_not_empty(&self.delist_function, "delist_function")?;
        ensure_not_empty(&self.list_function, "list_function")?;
        ensure_not_empty(&self.offer_function, "offer_function")?;
        ensure_not_empty(&self.eligibility_function, "eligibility_function")?;
        ensure_not_empty(&self.sold_lookup_function, "sold_lookup_function")?;

        if self.pacing_min > self.pacing_max {
            bail!(
                "pacing_min ({:?}) must not exceed pacing_max ({:?})",
                self.pacing_min,
                self.pacing_max
            );
        }

        if self.queue_wait.subsec_nanos() != 0 {
            bail!(
                "queue_wait ({:?}) must be a whole number of seconds",
                self.queue_wait
            );
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.max_iterations == Some(0) {
            bail!("max_iterations must be greater than 0 when set");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReconcilerConfigBuilder {
    gateway_url: Option<String>,
    gateway_user: Option<String>,
    gateway_password: Option<String>,
    table_name: Option<String>,
    table_key: Option<String>,
    work_source: Option<WorkSourceKind>,
    fetcher_functions: Option<Vec<String>>,
    delist_function: Option<String>,
    list_function: Option<String>,
    offer_function: Option<String>,
    eligibility_function: Option<String>,
    sold_lookup_function: Option<String>,
    pacing_min: Option<Duration>,
    pacing_max: Option<Duration>,
    remediation_cooldown: Option<Duration>,
    queue_wait: Option<Duration>,
    rpc_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    scan_utc_offset: Option<FixedOffset>,
    max_iterations: Option<u64>,
}

impl ReconcilerConfigBuilder {
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    pub fn gateway_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.gateway_user = Some(user.into());
        self.gateway_password = Some(password.into());
        self
    }

    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    pub fn table_key(mut self, key: impl Into<String>) -> Self {
        self.table_key = Some(key.into());
        self
    }

    pub fn work_source(mut self, source: WorkSourceKind) -> Self {
        self.work_source = Some(source);
        self
    }

    pub fn fetcher_functions<I, S>(mut self, fetchers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetcher_functions = Some(fetchers.into_iter().map(Into::into).collect());
        self
    }

    pub fn delist_function(mut self, function: impl Into<String>) -> Self {
        self.delist_function = Some(function.into());
        self
    }

    pub fn list_function(mut self, function: impl Into<String>) -> Self {
        self.list_function = Some(function.into());
        self
    }

    pub fn offer_function(mut self, function: impl Into<String>) -> Self {
        self.offer_function = Some(function.into());
        self
    }

    pub fn eligibility_function(mut self, function: impl Into<String>) -> Self {
        self.eligibility_function = Some(function.into());
        self
    }

    pub fn sold_lookup_function(mut self, function: impl Into<String>) -> Self {
        self.sold_lookup_function = Some(function.into());
        self
    }

    pub fn pacing_min(mut self, interval: Duration) -> Self {
        self.pacing_min = Some(interval);
        self
    }

    pub fn pacing_max(mut self, interval: Duration) -> Self {
        self.pacing_max = Some(interval);
        self
    }

    pub fn remediation_cooldown(mut self, cooldown: Duration) -> Self {
        self.remediation_cooldown = Some(cooldown);
        self
    }

    pub fn queue_wait(mut self, wait: Duration) -> Self {
        self.queue_wait = Some(wait);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn scan_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.scan_utc_offset = Some(offset);
        self
    }

    pub fn max_iterations(mut self, limit: u64) -> Self {
        self.max_iterations = Some(limit);
        self
    }

    pub fn build(self) -> Result<ReconcilerConfig> {
        let params = ReconcilerConfigParams {
            gateway_url: self.gateway_url.context("gateway_url is required")?,
            gateway_user: self.gateway_user.unwrap_or_default(),
            gateway_password: self.gateway_password.unwrap_or_default(),
            table_name: self.table_name.context("table_name is required")?,
            table_key: self
                .table_key
                .unwrap_or_else(|| DEFAULT_TABLE_KEY.to_owned()),
            work_source: self.work_source.context("work_source is required")?,
            fetcher_functions: self
                .fetcher_functions
                .context("fetcher_functions is required")?,
            delist_function: self.delist_function.context("delist_function is required")?,
            list_function: self.list_function.context("list_function is required")?,
            offer_function: self.offer_function.context("offer_function is required")?,
            eligibility_function: self
                .eligibility_function
                .context("eligibility_function is required")?,
            sold_lookup_function: self
                .sold_lookup_function
                .context("sold_lookup_function is required")?,
            pacing_min: self
                .pacing_min
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_PACING_MIN_MS)),
            pacing_max: self
                .pacing_max
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_PACING_MAX_MS)),
            remediation_cooldown: self
                .remediation_cooldown
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_REMEDIATION_COOLDOWN_MS)),
            queue_wait: self
                .queue_wait
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_QUEUE_WAIT_SECS)),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            scan_utc_offset: match self.scan_utc_offset {
                Some(offset) => offset,
                None => offset_from_hours(DEFAULT_SCAN_UTC_OFFSET_HOURS)?,
            },
            max_iterations: self.max_iterations,
        };

        ReconcilerConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("gateway_url must start with http:// or https://");
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_optional<T>(value: Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|err| anyhow::anyhow!("{key} has invalid value `{raw}`: {err}"))
        })
        .transpose()
}

fn offset_from_hours(hours: i32) -> Result<FixedOffset> {
    hours
        .checked_mul(3_600)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("utc offset of {hours} hours is out of range"))
}
