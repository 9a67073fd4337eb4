//! Output renderers and formatting helpers for CLI commands.

use std::fmt::Write as _;

use anyhow::anyhow;
use clap::ValueEnum;
use hsmlink_core::{ArchiveLocator, Checksum, ConnectorDescription};
use serde::Serialize;
use serde_json::json;

use crate::error::{CliError, CliResult};

/// Output style for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

fn to_json<T: Serialize>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn format_locator(locator: &ArchiveLocator, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Text => Ok(locator.to_string()),
        OutputFormat::Json => to_json(&json!({
            "locator": locator.as_str(),
            "type": locator.scheme(),
            "name": locator.authority(),
            "archive_path": locator.archive_path()?,
        })),
    }
}

pub(crate) fn format_staged(
    file_id: &str,
    checksums: &[Checksum],
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Text => {
            let mut text = format!("staged {file_id}");
            for checksum in checksums {
                let _ = write!(text, "\n{}: {}", checksum.algorithm, checksum.value);
            }
            Ok(text)
        }
        OutputFormat::Json => to_json(&json!({
            "file_id": file_id,
            "checksums": checksums,
        })),
    }
}

pub(crate) fn format_removed(locator: &ArchiveLocator, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Text => Ok(format!("removed {locator}")),
        OutputFormat::Json => to_json(&json!({ "removed": locator.as_str() })),
    }
}

pub(crate) fn format_description(
    description: &ConnectorDescription,
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(description),
        OutputFormat::Text => {
            let mut text = format!(
                "{} ({}://{})\n{}\nmountpoint: {}\nlayout: {}",
                description.provider,
                description.kind,
                description.name,
                description.summary,
                description
                    .mountpoint
                    .as_ref()
                    .map_or_else(|| "<unset>".to_string(), |path| path.display().to_string()),
                description.options.layout.as_str(),
            );
            let _ = write!(
                text,
                "\n{:<8} {:>10} {:>8} {:>11}",
                "POOL", "WORKERS", "GEN", "OUTSTANDING"
            );
            for stats in &description.pools {
                let _ = write!(
                    text,
                    "\n{:<8} {:>10} {:>8} {:>11}",
                    stats.pool.as_str(),
                    stats.workers.get(),
                    stats.generation,
                    stats.outstanding + stats.retired_outstanding,
                );
            }
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsmlink_config::ConnectorOptions;
    use hsmlink_core::PoolSet;
    use hsmlink_telemetry::Metrics;
    use serde_json::Value;

    fn rendered(result: CliResult<String>) -> anyhow::Result<String> {
        result.map_err(|err| anyhow!(err.display_message()))
    }

    #[test]
    fn locator_renders_as_text_and_json() -> anyhow::Result<()> {
        let locator = ArchiveLocator::new("hsm", "osm", "/000A1B")?;
        assert_eq!(
            rendered(format_locator(&locator, OutputFormat::Text))?,
            "hsm://osm/000A1B"
        );

        let json: Value =
            serde_json::from_str(&rendered(format_locator(&locator, OutputFormat::Json))?)?;
        assert_eq!(json["archive_path"], "/000A1B");
        assert_eq!(json["name"], "osm");
        Ok(())
    }

    #[test]
    fn staged_text_lists_checksums() -> anyhow::Result<()> {
        let checksums = vec![Checksum {
            algorithm: "adler32".to_string(),
            value: "0a1b2c3d".to_string(),
        }];
        let text = rendered(format_staged("000A1B", &checksums, OutputFormat::Text))?;
        assert_eq!(text, "staged 000A1B\nadler32: 0a1b2c3d");
        Ok(())
    }

    #[test]
    fn description_table_has_one_row_per_pool() -> anyhow::Result<()> {
        let metrics = Metrics::new()?;
        let description = ConnectorDescription {
            provider: "hsmlink",
            summary: "summary",
            kind: "hsm".to_string(),
            name: "osm".to_string(),
            mountpoint: None,
            options: ConnectorOptions::default(),
            pools: PoolSet::with_defaults(&metrics).stats(),
        };
        let text = rendered(format_description(&description, OutputFormat::Text))?;
        assert!(text.contains("mountpoint: <unset>"));
        assert!(text.lines().any(|line| line.starts_with("stage") && line.contains("1000")));
        assert_eq!(text.lines().count(), 8);
        Ok(())
    }
}
