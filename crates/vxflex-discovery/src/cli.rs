//! Command-line argument parsing with clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vxflex_inventory::config::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use vxflex_inventory::{CommandOsFacts, Credentials, DiscoveryConfig, OsLogin};

use crate::output::OutputTarget;

/// Default cache root used when no output file is given.
pub const DEFAULT_CACHE_DIR: &str = "/opt/Dell/ASM/cache";

/// Gather the inventory of a VxFlex OS gateway as a JSON fact document.
#[derive(Parser, Clone)]
#[command(name = "vxflex-discovery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Gateway host name or address.
    #[arg(short, long)]
    pub server: String,

    /// Gateway HTTPS port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Gateway user.
    #[arg(short, long)]
    pub username: String,

    /// Gateway password.
    #[arg(short, long, env = "PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Overall collection timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Write the document to this file instead of the cache.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cache root; the document is stored as `<server>.json` below it.
    #[arg(long, env = "VXFLEX_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Credential reference passed to the OS facts command.
    #[arg(long)]
    pub credential_id: Option<String>,

    /// Operating system user for OS facts.
    #[arg(long)]
    pub os_username: Option<String>,

    /// Operating system password for OS facts.
    #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
    pub os_password: Option<String>,

    /// Program printing the gateway host's OS facts as JSON.
    #[arg(long)]
    pub os_facts_command: Option<PathBuf>,
}

impl std::fmt::Debug for Cli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cli")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("output", &self.output)
            .field("cache_dir", &self.cache_dir)
            .field("credential_id", &self.credential_id)
            .field("os_username", &self.os_username)
            .field("os_password", &self.os_password.as_ref().map(|_| "<redacted>"))
            .field("os_facts_command", &self.os_facts_command)
            .finish()
    }
}

impl Cli {
    /// Discovery configuration for this invocation.
    ///
    /// OS enrichment is configured only when both an OS user and a facts
    /// command are given.
    #[must_use]
    pub fn to_config(&self) -> DiscoveryConfig {
        let credentials = Credentials::new(
            self.server.clone(),
            self.port,
            self.username.clone(),
            self.password.clone(),
        );
        let config =
            DiscoveryConfig::new(credentials).with_timeout(Duration::from_secs(self.timeout));

        match (&self.os_username, &self.os_facts_command) {
            (Some(username), Some(_)) => config.with_os_login(OsLogin {
                credential_id: self.credential_id.clone(),
                username: username.clone(),
                password: self.os_password.clone(),
            }),
            _ => config,
        }
    }

    /// The OS facts source, if a command was given.
    #[must_use]
    pub fn os_facts_source(&self) -> Option<CommandOsFacts> {
        self.os_facts_command.as_ref().map(CommandOsFacts::new)
    }

    /// Where the document is written.
    #[must_use]
    pub fn output_target(&self) -> OutputTarget {
        match &self.output {
            Some(path) => OutputTarget::File(path.clone()),
            None => OutputTarget::Cache {
                dir: self.cache_dir.clone(),
                server: self.server.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 7] = [
        "vxflex-discovery",
        "--server",
        "10.1.1.5",
        "--username",
        "admin",
        "--password",
        "Password1",
    ];

    fn parse(extra: &[&str]) -> Cli {
        Cli::parse_from(BASE.iter().chain(extra.iter()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.port, 443);
        assert_eq!(cli.timeout, 300);
        assert_eq!(cli.output, None);
        assert!(cli.os_facts_command.is_none());
    }

    #[test]
    fn test_to_config_carries_credentials_and_timeout() {
        let config = parse(&["--port", "8443", "--timeout", "60"]).to_config();
        assert_eq!(config.credentials.host, "10.1.1.5");
        assert_eq!(config.credentials.port, 8443);
        assert_eq!(config.credentials.username, "admin");
        assert_eq!(config.credentials.password, "Password1");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.os_login.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let result = Cli::try_parse_from(BASE.iter().chain(["--timeout", "0"].iter()));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_server_is_rejected() {
        let result = Cli::try_parse_from(["vxflex-discovery", "--username", "admin", "--password", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_os_login_requires_command() {
        let without_command = parse(&["--os-username", "root"]).to_config();
        assert!(without_command.os_login.is_none());

        let cli = parse(&[
            "--os-username",
            "root",
            "--os-password",
            "hunter2",
            "--credential-id",
            "cred-7",
            "--os-facts-command",
            "/usr/local/bin/gateway-facts",
        ]);
        let login = cli.to_config().os_login.unwrap();
        assert_eq!(login.username, "root");
        assert_eq!(login.password.as_deref(), Some("hunter2"));
        assert_eq!(login.credential_id.as_deref(), Some("cred-7"));
        assert_eq!(
            cli.os_facts_source().unwrap().program(),
            std::path::Path::new("/usr/local/bin/gateway-facts")
        );
    }

    #[test]
    fn test_output_target_prefers_file() {
        let cli = parse(&["--output", "/tmp/inventory.json"]);
        assert_eq!(
            cli.output_target(),
            OutputTarget::File(PathBuf::from("/tmp/inventory.json"))
        );
    }

    #[test]
    fn test_output_target_defaults_to_cache() {
        let cli = parse(&["--cache-dir", "/var/cache/vxflex"]);
        assert_eq!(
            cli.output_target(),
            OutputTarget::Cache {
                dir: PathBuf::from("/var/cache/vxflex"),
                server: "10.1.1.5".to_string(),
            }
        );
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let cli = parse(&["--os-password", "hunter2"]);
        let debug = format!("{cli:?}");
        assert!(!debug.contains("Password1"));
        assert!(!debug.contains("hunter2"));
    }
}
