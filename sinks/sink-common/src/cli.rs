use anstyle::{AnsiColor, Style};
use clap::builder::Styles;
use error_stack::{Result, ResultExt};
use price_sink_observability::init_tracing;
use tokio_util::sync::CancellationToken;

use crate::{SinkConnectorError, SinkConnectorErrorReportExt};

/// Initialize tracing and the sigint (ctrl-c) handler.
pub fn initialize_sink(
    package_name: &'static str,
    package_version: &'static str,
    ct: CancellationToken,
) -> Result<(), SinkConnectorError> {
    init_tracing(package_name, package_version)
        .map_err(|err| err.configuration("failed to initialize tracing"))?;

    set_ctrlc_handler(ct).map_err(|err| err.fatal("failed to setup ctrl-c handler"))?;

    Ok(())
}

/// Connect the cancellation token to the ctrl-c handler.
///
/// With the `termination` feature of `ctrlc` this also handles SIGTERM.
pub fn set_ctrlc_handler(ct: CancellationToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler({
        move || {
            ct.cancel();
        }
    })
    .attach_printable("failed to register ctrl-c handler")?;

    Ok(())
}

/// A clap style for all price sink CLI applications.
pub fn price_sink_cli_style() -> Styles {
    Styles::styled()
        .header(Style::new().bold().fg_color(Some(AnsiColor::Yellow.into())))
        .error(Style::new().bold().fg_color(Some(AnsiColor::Red.into())))
        .usage(Style::new().bold().fg_color(Some(AnsiColor::Yellow.into())))
        .literal(Style::new().fg_color(Some(AnsiColor::BrightCyan.into())))
        .placeholder(Style::new())
        .valid(Style::new().fg_color(Some(AnsiColor::BrightBlue.into())))
        .invalid(
            Style::new()
                .underline()
                .fg_color(Some(AnsiColor::Red.into())),
        )
}
