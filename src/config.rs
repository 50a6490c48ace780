use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::env;

/// Command-line + environment configuration.
///
/// CLI flags override the corresponding `ASSET_GATEWAY_*` environment
/// variables. Values without a default are required for their subcommand and
/// missing ones are a fatal startup error naming both the flag and the
/// variable.
#[derive(Parser, Debug)]
#[command(author, version, about = "Asset storage gateway and migration tooling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve bucket objects over HTTP
    Serve {
        /// Host to bind to (overrides ASSET_GATEWAY_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides ASSET_GATEWAY_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Bucket root directory (overrides ASSET_GATEWAY_BUCKET_ROOT)
        #[arg(long)]
        bucket_root: Option<String>,
    },
    /// Upload a local directory tree into the bucket
    Upload {
        /// Local assets root to walk (overrides ASSET_GATEWAY_ASSETS_ROOT)
        #[arg(long)]
        assets_root: Option<String>,

        /// Bucket root directory (overrides ASSET_GATEWAY_BUCKET_ROOT)
        #[arg(long)]
        bucket_root: Option<String>,
    },
    /// Move the legacy uploads directory into the assets root
    Migrate {
        /// Legacy uploads directory (overrides ASSET_GATEWAY_LEGACY_DIR)
        #[arg(long)]
        legacy_dir: Option<String>,

        /// Assets root to move into (overrides ASSET_GATEWAY_ASSETS_ROOT)
        #[arg(long)]
        assets_root: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub bucket_root: String,
}

impl ServeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub assets_root: String,
    pub bucket_root: String,
}

#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub legacy_dir: String,
    pub assets_root: String,
}

/// Resolved per-subcommand configuration.
#[derive(Debug)]
pub enum AppConfig {
    Serve(ServeConfig),
    Upload(UploadConfig),
    Migrate(MigrateConfig),
}

impl AppConfig {
    /// Parse environment variables + CLI args into a per-command config.
    pub fn from_env_and_args() -> Result<Self> {
        let cli = Cli::parse();
        Self::resolve(cli.command)
    }

    fn resolve(command: Command) -> Result<Self> {
        match command {
            Command::Serve {
                host,
                port,
                bucket_root,
            } => {
                let env_port = match env::var("ASSET_GATEWAY_PORT") {
                    Ok(value) => Some(value.parse::<u16>().with_context(|| {
                        format!("parsing ASSET_GATEWAY_PORT value `{}`", value)
                    })?),
                    Err(env::VarError::NotPresent) => None,
                    Err(err) => return Err(err).context("reading ASSET_GATEWAY_PORT"),
                };
                Ok(Self::Serve(ServeConfig {
                    host: host
                        .or_else(|| env::var("ASSET_GATEWAY_HOST").ok())
                        .unwrap_or_else(|| "0.0.0.0".into()),
                    port: port.or(env_port).unwrap_or(3000),
                    bucket_root: resolve_bucket_root(bucket_root),
                }))
            }
            Command::Upload {
                assets_root,
                bucket_root,
            } => Ok(Self::Upload(UploadConfig {
                assets_root: required(assets_root, "--assets-root", "ASSET_GATEWAY_ASSETS_ROOT")?,
                bucket_root: resolve_bucket_root(bucket_root),
            })),
            Command::Migrate {
                legacy_dir,
                assets_root,
            } => Ok(Self::Migrate(MigrateConfig {
                legacy_dir: required(legacy_dir, "--legacy-dir", "ASSET_GATEWAY_LEGACY_DIR")?,
                assets_root: required(assets_root, "--assets-root", "ASSET_GATEWAY_ASSETS_ROOT")?,
            })),
        }
    }
}

fn resolve_bucket_root(cli: Option<String>) -> String {
    cli.or_else(|| env::var("ASSET_GATEWAY_BUCKET_ROOT").ok())
        .unwrap_or_else(|| "./data/bucket".into())
}

fn required(cli: Option<String>, flag: &str, var: &str) -> Result<String> {
    if let Some(value) = cli {
        return Ok(value);
    }
    match env::var(var) {
        Ok(value) => Ok(value),
        Err(env::VarError::NotPresent) => {
            Err(anyhow!("missing required value: pass {flag} or set {var}"))
        }
        Err(err) => Err(err).with_context(|| format!("reading {var}")),
    }
}
