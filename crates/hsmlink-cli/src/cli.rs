//! Argument parsing, connector construction, and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hsmlink_config::{ApplyMode, ConfigUpdate, ConnectorOptions, IdPolicy, PathLayout, PoolKind};
use hsmlink_core::NearlineConnector;
use hsmlink_telemetry::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, Metrics, build_sha, init_logging,
};
use tracing::info;

use crate::commands::{handle_describe, handle_flush, handle_remove, handle_stage};
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

const DEFAULT_TYPE: &str = "hsm";
const DEFAULT_NAME: &str = "archive";

/// Parses CLI arguments, runs the requested command against a freshly
/// configured connector, and returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.into(),
        build_sha: build_sha(),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: logging unavailable: {err}");
    }

    match execute(cli).await {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

pub(crate) async fn execute(cli: Cli) -> CliResult<String> {
    let metrics = Metrics::new().map_err(CliError::failure)?;
    let connector = NearlineConnector::new(&cli.kind, &cli.name, cli.options(), metrics)?;

    let update = cli.config_update();
    if !update.is_empty() || cli.command.requires_mountpoint() {
        connector.apply_configuration(&update)?;
    }

    let command = cli.command.label();
    let result = match cli.command {
        Command::Flush(args) => handle_flush(&connector, args, cli.output).await,
        Command::Stage(args) => handle_stage(&connector, args, cli.output).await,
        Command::Remove(args) => handle_remove(&connector, args, cli.output).await,
        Command::Describe(args) => handle_describe(&connector, &args, cli.output),
    };

    connector.shutdown();
    connector.drain().await;
    info!(command, success = result.is_ok(), "command finished");
    result
}

#[derive(Parser)]
#[command(
    name = "hsmlink",
    about = "Flush, stage, and remove files through an HSM nearline connector"
)]
pub(crate) struct Cli {
    #[arg(long = "type", global = true, env = "HSMLINK_TYPE", default_value = DEFAULT_TYPE)]
    kind: String,
    #[arg(long, global = true, env = "HSMLINK_NAME", default_value = DEFAULT_NAME)]
    name: String,
    #[arg(long, global = true, env = "HSMLINK_MOUNTPOINT")]
    mountpoint: Option<PathBuf>,
    #[arg(long, global = true, help = "Concurrent flush workers")]
    puts: Option<String>,
    #[arg(long, global = true, help = "Concurrent stage workers")]
    gets: Option<String>,
    #[arg(long, global = true, help = "Concurrent remove workers")]
    dels: Option<String>,
    #[arg(
        long,
        global = true,
        env = "HSMLINK_LAYOUT",
        value_parser = parse_layout,
        default_value = "flat"
    )]
    layout: PathLayout,
    #[arg(
        long,
        global = true,
        help = "Accept file identifiers verbatim instead of rejecting separators and dot segments"
    )]
    permissive_ids: bool,
    #[arg(
        long,
        global = true,
        help = "Apply configuration fields one by one, keeping those before a failure"
    )]
    partial_apply: bool,
    #[arg(long, global = true, env = "HSMLINK_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    #[arg(
        long,
        global = true,
        env = "HSMLINK_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormatArg::Pretty
    )]
    log_format: LogFormatArg,
    #[arg(
        long = "output",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Select output format for command results"
    )]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn options(&self) -> ConnectorOptions {
        ConnectorOptions {
            layout: self.layout,
            id_policy: if self.permissive_ids {
                IdPolicy::Permissive
            } else {
                IdPolicy::Strict
            },
            apply_mode: if self.partial_apply {
                ApplyMode::Partial
            } else {
                ApplyMode::Atomic
            },
        }
    }

    fn config_update(&self) -> ConfigUpdate {
        let mut update = ConfigUpdate::default();
        if let Some(mountpoint) = &self.mountpoint {
            update = update.with_mountpoint(mountpoint);
        }
        for (kind, raw) in [
            (PoolKind::Flush, &self.puts),
            (PoolKind::Stage, &self.gets),
            (PoolKind::Remove, &self.dels),
        ] {
            if let Some(raw) = raw {
                update = update.with_workers(kind, raw.as_str());
            }
        }
        update
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Copy a local file into the archive and print its locator.
    Flush(FlushArgs),
    /// Copy an archived file into a new local file.
    Stage(StageArgs),
    /// Delete the archived copy named by a locator.
    Remove(RemoveArgs),
    /// Print the connector identity, mountpoint, and pool sizes.
    Describe(DescribeArgs),
}

impl Command {
    const fn label(&self) -> &'static str {
        match self {
            Self::Flush(_) => "flush",
            Self::Stage(_) => "stage",
            Self::Remove(_) => "remove",
            Self::Describe(_) => "describe",
        }
    }

    const fn requires_mountpoint(&self) -> bool {
        !matches!(self, Self::Describe(_))
    }
}

#[derive(Args)]
pub(crate) struct FlushArgs {
    #[arg(long)]
    pub(crate) file_id: String,
    #[arg(long)]
    pub(crate) path: PathBuf,
    #[arg(long = "meta", value_parser = parse_meta, help = "Storage-class metadata as key=value")]
    pub(crate) meta: Vec<(String, String)>,
}

#[derive(Args)]
pub(crate) struct StageArgs {
    #[arg(long)]
    pub(crate) file_id: String,
    #[arg(long)]
    pub(crate) path: PathBuf,
    #[arg(long = "meta", value_parser = parse_meta, help = "Storage-class metadata as key=value")]
    pub(crate) meta: Vec<(String, String)>,
}

#[derive(Args)]
pub(crate) struct RemoveArgs {
    #[arg(long)]
    pub(crate) locator: String,
}

#[derive(Args)]
pub(crate) struct DescribeArgs {
    #[arg(long, help = "Append the Prometheus metrics exposition")]
    pub(crate) metrics: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

fn parse_layout(raw: &str) -> Result<PathLayout, String> {
    raw.parse()
        .map_err(|_| format!("unknown layout {raw:?}; expected flat or store_group"))
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("metadata {raw:?} must be key=value"))?;
    if key.is_empty() {
        return Err(format!("metadata {raw:?} has an empty key"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsmlink_test_support::assert::{assert_absent, assert_same_contents};
    use hsmlink_test_support::fixtures::ArchiveFixture;

    fn parse(args: &[&str]) -> anyhow::Result<Cli> {
        Ok(Cli::try_parse_from(
            std::iter::once("hsmlink").chain(args.iter().copied()),
        )?)
    }

    async fn run_ok(args: &[&str]) -> anyhow::Result<String> {
        execute(parse(args)?)
            .await
            .map_err(|err| anyhow::anyhow!(err.display_message()))
    }

    #[test]
    fn global_flags_build_update_and_options() -> anyhow::Result<()> {
        let cli = parse(&[
            "--mountpoint",
            "/archive",
            "--puts",
            "4",
            "--dels",
            "2",
            "--layout",
            "store-group",
            "--permissive-ids",
            "remove",
            "--locator",
            "hsm://archive/000A1B",
        ])?;
        let update = cli.config_update();
        assert_eq!(update.mountpoint, Some(PathBuf::from("/archive")));
        assert_eq!(update.workers(PoolKind::Flush), Some("4"));
        assert_eq!(update.workers(PoolKind::Stage), None);
        assert_eq!(update.workers(PoolKind::Remove), Some("2"));

        let options = cli.options();
        assert_eq!(options.layout, PathLayout::StoreGroup);
        assert_eq!(options.id_policy, IdPolicy::Permissive);
        assert_eq!(options.apply_mode, ApplyMode::Atomic);
        Ok(())
    }

    #[test]
    fn meta_requires_key_value_pairs() {
        assert_eq!(
            parse_meta("store=atlas"),
            Ok(("store".to_string(), "atlas".to_string()))
        );
        assert!(parse_meta("store").is_err());
        assert!(parse_meta("=atlas").is_err());
        assert!(parse_layout("tree").is_err());
    }

    #[tokio::test]
    async fn flush_stage_remove_through_the_cli() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let mountpoint = fixture.mountpoint().display().to_string();
        let local = fixture.write_cache_file("000A1B", b"cli payload")?;
        let local_arg = local.display().to_string();

        let locator = run_ok(&[
            "--type", "hsm", "--name", "osm", "--mountpoint", &mountpoint, "flush",
            "--file-id", "000A1B", "--path", &local_arg,
        ])
        .await?;
        assert_eq!(locator, "hsm://osm/000A1B");

        let restored = fixture.cache_path("restored").display().to_string();
        let staged = run_ok(&[
            "--mountpoint", &mountpoint, "stage", "--file-id", "000A1B", "--path", &restored,
        ])
        .await?;
        assert_eq!(staged, "staged 000A1B");
        assert_same_contents(&local, &fixture.cache_path("restored"))?;

        let removed = run_ok(&[
            "--mountpoint", &mountpoint, "--output", "json", "remove", "--locator", &locator,
        ])
        .await?;
        assert!(removed.contains("\"removed\""));
        assert_absent(&fixture.archive_path("/000A1B"))?;
        Ok(())
    }

    #[tokio::test]
    async fn missing_mountpoint_is_a_validation_error() -> anyhow::Result<()> {
        let err = execute(parse(&["flush", "--file-id", "000A1B", "--path", "/tmp/none"])?)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.display_message().contains("mountpoint"));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_worker_count_is_a_validation_error() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let mountpoint = fixture.mountpoint().display().to_string();
        let err = execute(parse(&["--mountpoint", &mountpoint, "--gets", "abc", "describe"])?)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.display_message().contains("gets"));
        Ok(())
    }

    #[tokio::test]
    async fn staging_a_missing_file_is_an_operational_failure() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let mountpoint = fixture.mountpoint().display().to_string();
        let target = fixture.cache_path("absent").display().to_string();
        let err = execute(parse(&[
            "--mountpoint", &mountpoint, "stage", "--file-id", "absent", "--path", &target,
        ])?)
        .await
        .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.display_message().contains("stage.open_source"));
        Ok(())
    }

    #[tokio::test]
    async fn describe_works_without_mountpoint() -> anyhow::Result<()> {
        let text = run_ok(&["--gets", "16", "--partial-apply", "describe", "--metrics"]).await;
        // Worker counts alone still need an established mountpoint.
        assert!(text.is_err());

        let text = run_ok(&["describe", "--metrics"]).await?;
        assert!(text.contains("mountpoint: <unset>"));
        assert!(text.contains("hsm_pool_workers"));
        Ok(())
    }
}
