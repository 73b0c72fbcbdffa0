use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::config::TuningConfig;
use crate::providers::ProviderConfig;
use crate::resource::ResourceId;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// JSON-lines audit log [default: XDG data dir]
    #[arg(long, global = true, env = "DRIFTGUARD_AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one reconciliation cycle
    Run(RunArgs),
    /// Reconcile continuously until interrupted
    Watch(WatchArgs),
    /// Show drift without correcting anything
    Diff(RunArgs),
    /// Query the audit log
    Audit(AuditArgs),
    /// Load and validate the manifest
    Validate(ManifestArgs),
    /// Delete a declared resource, refusing immutable ones
    Destroy(TargetArgs),
    /// Recreate a declared resource that is missing from the cluster
    Recreate(TargetArgs),
}

#[derive(clap::Args, Debug)]
pub struct ManifestArgs {
    #[arg(long, env = "DRIFTGUARD_MANIFEST")]
    pub manifest: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct ClusterArgs {
    /// Local JSON file holding live state
    #[arg(long, env = "DRIFTGUARD_STATE_FILE", conflicts_with = "cluster_url")]
    pub state_file: Option<PathBuf>,

    #[arg(long, env = "DRIFTGUARD_CLUSTER_URL")]
    pub cluster_url: Option<String>,

    #[arg(long, env = "DRIFTGUARD_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl ClusterArgs {
    pub fn provider_name(&self) -> &'static str {
        if self.cluster_url.is_some() {
            "http"
        } else {
            "file"
        }
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            state_file: self.state_file.clone(),
            cluster_url: self.cluster_url.clone(),
            token: self.token.clone(),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct TuningArgs {
    /// Resources reconciled in parallel
    #[arg(long, env = "DRIFTGUARD_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    /// Attempts per API call before escalating
    #[arg(long, env = "DRIFTGUARD_MAX_ATTEMPTS", default_value_t = 4)]
    pub max_attempts: u32,

    #[arg(long, env = "DRIFTGUARD_BASE_DELAY_MS", default_value_t = 500)]
    pub base_delay_ms: u64,

    #[arg(long, env = "DRIFTGUARD_MAX_DELAY_MS", default_value_t = 30_000)]
    pub max_delay_ms: u64,
}

impl TuningArgs {
    pub fn to_config(&self, interval_secs: u64) -> TuningConfig {
        TuningConfig {
            concurrency: self.concurrency,
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            interval_secs,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Seconds between cycles
    #[arg(long, env = "DRIFTGUARD_INTERVAL", default_value_t = 60)]
    pub interval: u64,
}

#[derive(clap::Args, Debug)]
pub struct AuditArgs {
    /// Only records for this resource (kind/name)
    #[arg(long)]
    pub resource: Option<ResourceId>,

    /// Inclusive lower bound (RFC 3339)
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Exclusive upper bound (RFC 3339)
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct TargetArgs {
    /// Target resource (kind/name)
    pub resource: ResourceId,

    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(flatten)]
    pub cluster: ClusterArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn with_env_removed<T>(keys: &[&str], f: impl FnOnce() -> T) -> T {
        let backups: Vec<_> = keys.iter().map(|k| (*k, std::env::var(k).ok())).collect();
        unsafe {
            for key in keys {
                std::env::remove_var(key);
            }
        }
        let result = f();
        unsafe {
            for (key, value) in backups {
                if let Some(value) = value {
                    std::env::set_var(key, value);
                }
            }
        }
        result
    }

    #[test]
    #[serial]
    fn test_run_args_from_flags() {
        let cli = with_env_removed(&["DRIFTGUARD_CLUSTER_URL", "DRIFTGUARD_CONCURRENCY"], || {
            Cli::parse_from([
                "driftguard",
                "run",
                "--manifest=desired.yaml",
                "--state-file=live.json",
            ])
        });

        if let Command::Run(args) = cli.command {
            assert_eq!(args.manifest.manifest, PathBuf::from("desired.yaml"));
            assert_eq!(args.cluster.state_file, Some(PathBuf::from("live.json")));
            assert_eq!(args.cluster.provider_name(), "file");
            assert_eq!(args.tuning.concurrency, 4);
        } else {
            panic!("Expected Run command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_cluster_url_selects_http_provider() {
        let cli = with_env_removed(&["DRIFTGUARD_STATE_FILE"], || {
            Cli::parse_from([
                "driftguard",
                "diff",
                "--manifest=m.yaml",
                "--cluster-url=https://cluster.internal",
                "--token=secret",
            ])
        });

        if let Command::Diff(args) = cli.command {
            assert_eq!(args.cluster.provider_name(), "http");
            let config = args.cluster.provider_config();
            assert_eq!(config.token, Some("secret".to_string()));
        } else {
            panic!("Expected Diff command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_state_file_conflicts_with_cluster_url() {
        let result = with_env_removed(&[], || {
            Cli::try_parse_from([
                "driftguard",
                "run",
                "--manifest=m.yaml",
                "--state-file=live.json",
                "--cluster-url=https://cluster.internal",
            ])
        });
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_manifest_from_env_var_fallback() {
        let backup = std::env::var("DRIFTGUARD_MANIFEST").ok();
        unsafe {
            std::env::set_var("DRIFTGUARD_MANIFEST", "/etc/driftguard/manifest.yaml");
        }

        let cli = Cli::parse_from(["driftguard", "validate"]);

        unsafe {
            match backup {
                Some(value) => std::env::set_var("DRIFTGUARD_MANIFEST", value),
                None => std::env::remove_var("DRIFTGUARD_MANIFEST"),
            }
        }

        if let Command::Validate(args) = cli.command {
            assert_eq!(args.manifest, PathBuf::from("/etc/driftguard/manifest.yaml"));
        } else {
            panic!("Expected Validate command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_watch_interval() {
        let cli = with_env_removed(&["DRIFTGUARD_INTERVAL"], || {
            Cli::parse_from([
                "driftguard",
                "watch",
                "--manifest=m.yaml",
                "--state-file=s.json",
                "--interval=15",
            ])
        });

        if let Command::Watch(args) = cli.command {
            assert_eq!(args.interval, 15);
            assert_eq!(args.run.tuning.to_config(args.interval).interval_secs, 15);
        } else {
            panic!("Expected Watch command, got {:?}", cli.command);
        }
    }

    #[test]
    fn test_audit_filters_parse() {
        let cli = Cli::parse_from([
            "driftguard",
            "audit",
            "--resource=volume/pg-data",
            "--since=2026-01-01T00:00:00Z",
            "--json",
            "--audit-log=/tmp/audit.jsonl",
        ]);

        assert_eq!(cli.audit_log, Some(PathBuf::from("/tmp/audit.jsonl")));
        if let Command::Audit(args) = cli.command {
            assert_eq!(args.resource, Some(ResourceId::new("volume", "pg-data")));
            assert!(args.since.is_some());
            assert!(args.until.is_none());
            assert!(args.json);
        } else {
            panic!("Expected Audit command, got {:?}", cli.command);
        }
    }

    #[test]
    fn test_audit_rejects_malformed_resource() {
        let result = Cli::try_parse_from(["driftguard", "audit", "--resource=pg-data"]);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_destroy_positional_resource() {
        let cli = with_env_removed(&["DRIFTGUARD_CLUSTER_URL"], || {
            Cli::parse_from([
                "driftguard",
                "destroy",
                "bucket/assets",
                "--manifest=m.yaml",
                "--state-file=s.json",
            ])
        });

        if let Command::Destroy(args) = cli.command {
            assert_eq!(args.resource, ResourceId::new("bucket", "assets"));
        } else {
            panic!("Expected Destroy command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_recreate_positional_resource() {
        let cli = with_env_removed(&["DRIFTGUARD_CLUSTER_URL"], || {
            Cli::parse_from([
                "driftguard",
                "recreate",
                "volume/pg-data",
                "--manifest=m.yaml",
                "--state-file=s.json",
            ])
        });

        if let Command::Recreate(args) = cli.command {
            assert_eq!(args.resource, ResourceId::new("volume", "pg-data"));
            assert_eq!(args.cluster.provider_name(), "file");
        } else {
            panic!("Expected Recreate command, got {:?}", cli.command);
        }
    }
}
