use std::{
    fs,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use geo::Point;
use hazroute_core::{EngineConfig, Error, loading::GridSpec};
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(
    name = "hazroute-server",
    version,
    about = "HTTP interface to the hazard-aware route optimization engine"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8080
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// GeoJSON road network. A synthetic grid is served when absent
    #[arg(short, long)]
    pub network: Option<PathBuf>,

    #[arg(long)]
    pub grid_rows: Option<usize>,

    #[arg(long)]
    pub grid_cols: Option<usize>,

    /// Grid spacing in meters
    #[arg(long)]
    pub grid_spacing: Option<f64>,

    /// Seconds before a request is aborted with 408
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Requests processed at once, the rest wait
    #[arg(long)]
    pub concurrency_limit: Option<usize>,

    /// Size of the rayon pool used by route searches
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Synthetic network served when no network file is configured
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// South-west corner as `[lon, lat]`
    pub origin: [f64; 2],
    pub rows: usize,
    pub cols: usize,
    pub spacing: f64,
    pub speed: f64,
    pub relief: f64,
    pub arterial_every: Option<usize>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0],
            rows: 40,
            cols: 40,
            spacing: 100.0,
            speed: 13.9,
            relief: 30.0,
            arterial_every: Some(5),
        }
    }
}

impl GridConfig {
    pub fn spec(&self) -> GridSpec {
        GridSpec {
            origin: Point::new(self.origin[0], self.origin[1]),
            rows: self.rows,
            cols: self.cols,
            spacing: self.spacing,
            speed: self.speed,
            relief: self.relief,
            arterial_every: self.arterial_every,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub network: Option<PathBuf>,
    pub grid: GridConfig,
    pub request_timeout_secs: u64,
    pub concurrency_limit: usize,
    pub threads: Option<usize>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            network: None,
            grid: GridConfig::default(),
            request_timeout_secs: 30,
            concurrency_limit: 64,
            threads: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Failed to open file '{}': {}", path.display(), e),
            )
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Configuration file (if any) with command line flags applied on top
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or a value is out of range
    pub fn load(cli: &Cli) -> Result<Self, Error> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, cli: &Cli) {
        if let Some(bind) = cli.bind {
            self.bind = bind;
        }
        if let Some(network) = &cli.network {
            self.network = Some(network.clone());
        }
        if let Some(rows) = cli.grid_rows {
            self.grid.rows = rows;
        }
        if let Some(cols) = cli.grid_cols {
            self.grid.cols = cols;
        }
        if let Some(spacing) = cli.grid_spacing {
            self.grid.spacing = spacing;
        }
        if let Some(timeout) = cli.request_timeout {
            self.request_timeout_secs = timeout;
        }
        if let Some(limit) = cli.concurrency_limit {
            self.concurrency_limit = limit;
        }
        if cli.threads.is_some() {
            self.threads = cli.threads;
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".to_string()));
        }
        if self.concurrency_limit == 0 {
            return Err(Error::Config("concurrency_limit must be positive".to_string()));
        }
        if self.threads == Some(0) {
            return Err(Error::Config("threads must be positive".to_string()));
        }
        self.engine.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
