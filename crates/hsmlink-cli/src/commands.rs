//! Command handlers; each runs one connector operation and prints its result.

use hsmlink_core::{ArchiveLocator, NearlineConnector, RemoveRequest, TransferRequest};
use tracing::debug;

use crate::cli::{DescribeArgs, FlushArgs, RemoveArgs, StageArgs};
use crate::error::{CliError, CliResult};
use crate::output::{
    OutputFormat, format_description, format_locator, format_removed, format_staged,
};

pub(crate) async fn handle_flush(
    connector: &NearlineConnector,
    args: FlushArgs,
    format: OutputFormat,
) -> CliResult<String> {
    let mut request = TransferRequest::new(args.file_id, args.path);
    for (key, value) in args.meta {
        request = request.with_metadata(key, value);
    }
    debug!(file_id = %request.file_id, "submitting flush");
    let locator = connector.flush(request).await?;
    format_locator(&locator, format)
}

pub(crate) async fn handle_stage(
    connector: &NearlineConnector,
    args: StageArgs,
    format: OutputFormat,
) -> CliResult<String> {
    if args.path.exists() {
        return Err(CliError::validation(format!(
            "{} already exists; stage only writes new files",
            args.path.display()
        )));
    }
    let file_id = args.file_id.clone();
    let mut request = TransferRequest::new(args.file_id, args.path);
    for (key, value) in args.meta {
        request = request.with_metadata(key, value);
    }
    debug!(file_id = %file_id, "submitting stage");
    let checksums = connector.stage(request).await?;
    format_staged(&file_id, &checksums, format)
}

pub(crate) async fn handle_remove(
    connector: &NearlineConnector,
    args: RemoveArgs,
    format: OutputFormat,
) -> CliResult<String> {
    let locator = ArchiveLocator::parse(&args.locator)?;
    debug!(locator = %locator, "submitting remove");
    connector.remove(RemoveRequest::new(locator.clone())).await?;
    format_removed(&locator, format)
}

pub(crate) fn handle_describe(
    connector: &NearlineConnector,
    args: &DescribeArgs,
    format: OutputFormat,
) -> CliResult<String> {
    let mut text = format_description(&connector.describe(), format)?;
    if args.metrics {
        let rendered = connector.metrics().render().map_err(CliError::failure)?;
        text.push('\n');
        text.push_str(rendered.trim_end());
    }
    Ok(text)
}
