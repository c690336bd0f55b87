//! Purpose: Resolve where the catalog service lives and how long to wait for it.
//! Exports: `ClientConfig`, `Mode`, `base_url`.
//! Role: Explicit inputs first, then `DATACAT_*` environment, then defaults.
//! Invariants: A resolved base URL is http(s) and has no query or fragment.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use std::time::Duration;
use url::Url;

pub const ENV_URL: &str = "DATACAT_URL";
pub const ENV_EXPERIMENT: &str = "DATACAT_EXPERIMENT";
pub const ENV_MODE: &str = "DATACAT_MODE";
pub const ENV_TIMEOUT_MS: &str = "DATACAT_TIMEOUT_MS";

pub const DEFAULT_SERVER: &str = "https://srs.slac.stanford.edu";
pub const DEFAULT_EXPERIMENT: &str = "lsst";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Prod,
    Dev,
}

impl Mode {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" | "" => Ok(Mode::Prod),
            "dev" => Ok(Mode::Dev),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown mode {other:?}"))
                .with_hint("expected prod or dev")),
        }
    }
}

/// Service root for an experiment, e.g. `https://srs.slac.stanford.edu/datacat/lsst/r`.
pub fn base_url(experiment: &str, mode: Mode) -> String {
    let app = match mode {
        Mode::Prod => "datacat",
        Mode::Dev => "datacat-dev",
    };
    format!("{DEFAULT_SERVER}/{app}/{experiment}/r")
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, Error> {
        Ok(Self {
            base_url: normalize_base_url(base_url.as_ref())?,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from optional explicit values, falling back to the environment.
    pub fn resolve(
        url: Option<&str>,
        experiment: Option<&str>,
        mode: Option<&str>,
    ) -> Result<Self, Error> {
        Self::resolve_with(url, experiment, mode, |key| std::env::var(key).ok())
    }

    fn resolve_with(
        url: Option<&str>,
        experiment: Option<&str>,
        mode: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        let explicit = url.map(str::to_string).or_else(|| env(ENV_URL));
        let base = match explicit {
            Some(base) => base,
            None => {
                let experiment = experiment
                    .map(str::to_string)
                    .or_else(|| env(ENV_EXPERIMENT))
                    .unwrap_or_else(|| DEFAULT_EXPERIMENT.to_string());
                let mode = match mode.map(str::to_string).or_else(|| env(ENV_MODE)) {
                    Some(raw) => Mode::parse(&raw)?,
                    None => Mode::default(),
                };
                base_url(&experiment, mode)
            }
        };
        let mut config = Self::new(base)?;
        if let Some(raw) = env(ENV_TIMEOUT_MS) {
            let millis: u64 = raw.trim().parse().map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("{ENV_TIMEOUT_MS} must be a whole number of milliseconds"))
                    .with_source(err)
            })?;
            config.timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid catalog base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("catalog base url must use http or https scheme"));
    }
    if url.cannot_be_a_base() {
        return Err(Error::new(ErrorKind::Usage).with_message("catalog base url cannot be a base"));
    }
    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
