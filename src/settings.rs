use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub authz: Authz,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authz {
    /// Directory holding the `.kdl` identity, binding and role documents
    pub policies_dir: PathBuf,
    /// Reload the snapshot when files in `policies_dir` change
    #[serde(default = "default_watch")]
    pub watch: bool,
    /// Quiet period before a burst of file events triggers one reload
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_watch() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    750
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for Authz {
    fn default() -> Self {
        Self {
            policies_dir: PathBuf::from("policies"),
            watch: default_watch(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with_env_prefix(path, "GATEKEEP")
    }

    fn load_with_env_prefix(path: &str, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default(
                "authz.policies_dir",
                Authz::default().policies_dir.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default("authz.watch", default_watch())
            .into_diagnostic()?
            .set_default("authz.debounce_ms", default_debounce_ms())
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: GATEKEEP__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix(env_prefix).separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize policies dir to be relative to current dir
        if s.authz.policies_dir.is_relative() {
            s.authz.policies_dir = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.authz.policies_dir);
        }

        Ok(s)
    }
}
