use std::{fmt, process::ExitCode};

use error_stack::{Context, Report, Result, ResultExt};

/// Sink connector error.
///
/// Only [SinkConnectorError::Temporary] is retried, by the stream session. Every other
/// context terminates the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkConnectorError {
    /// Configuration error. Should not retry.
    Configuration,
    /// The module output does not match the pinned type. Should not retry.
    Decode,
    /// Transient transport error. Should retry.
    Temporary,
    /// Unrecoverable transport error. Should not retry.
    Transport,
    /// The downstream sink failed. Should not retry.
    Sink,
    /// A compensation action failed while undoing blocks. Should not retry.
    UndoReconciliation,
    /// The cursor store failed. Should not retry.
    Persistence,
    /// Fatal error. Should not retry.
    Fatal,
}

pub trait ReportExt {
    fn to_exit_code(&self) -> ExitCode;
}

impl error_stack::Context for SinkConnectorError {}

impl fmt::Display for SinkConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkConnectorError::Configuration => f.write_str("sink error: configuration"),
            SinkConnectorError::Decode => f.write_str("sink error: decode"),
            SinkConnectorError::Temporary => f.write_str("sink error: temporary"),
            SinkConnectorError::Transport => f.write_str("sink error: transport"),
            SinkConnectorError::Sink => f.write_str("sink error: downstream sink"),
            SinkConnectorError::UndoReconciliation => {
                f.write_str("sink error: undo reconciliation")
            }
            SinkConnectorError::Persistence => f.write_str("sink error: persistence"),
            SinkConnectorError::Fatal => f.write_str("sink error: fatal"),
        }
    }
}

impl SinkConnectorError {
    pub fn is_temporary(&self) -> bool {
        matches!(self, SinkConnectorError::Temporary)
    }

    /// Process exit code, based on sysexits.h
    pub fn exit_code(&self) -> u8 {
        match self {
            SinkConnectorError::Configuration => 78,
            SinkConnectorError::Decode => 65,
            SinkConnectorError::Temporary => 75,
            _ => 1,
        }
    }
}

impl<T> ReportExt for Result<T, SinkConnectorError> {
    fn to_exit_code(&self) -> ExitCode {
        match self {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{:?}", err);
                ExitCode::from(err.current_context().exit_code())
            }
        }
    }
}

pub trait SinkConnectorErrorResultExt {
    type Ok;
    fn configuration(self, reason: &str) -> Result<Self::Ok, SinkConnectorError>;
    fn temporary(self, reason: &str) -> Result<Self::Ok, SinkConnectorError>;
    fn transport(self, reason: &str) -> Result<Self::Ok, SinkConnectorError>;
    fn persistence(self, reason: &str) -> Result<Self::Ok, SinkConnectorError>;
    fn fatal(self, reason: &str) -> Result<Self::Ok, SinkConnectorError>;
}

impl<T, C> SinkConnectorErrorResultExt for core::result::Result<T, C>
where
    C: Context,
{
    type Ok = T;

    fn configuration(self, reason: &str) -> Result<T, SinkConnectorError> {
        self.change_context(SinkConnectorError::Configuration)
            .attach_printable(format!("configuration error: {reason}"))
    }

    fn temporary(self, reason: &str) -> Result<T, SinkConnectorError> {
        self.change_context(SinkConnectorError::Temporary)
            .attach_printable(format!("temporary error: {reason}"))
    }

    fn transport(self, reason: &str) -> Result<T, SinkConnectorError> {
        self.change_context(SinkConnectorError::Transport)
            .attach_printable(format!("transport error: {reason}"))
    }

    fn persistence(self, reason: &str) -> Result<T, SinkConnectorError> {
        self.change_context(SinkConnectorError::Persistence)
            .attach_printable(format!("persistence error: {reason}"))
    }

    fn fatal(self, reason: &str) -> Result<T, SinkConnectorError> {
        self.change_context(SinkConnectorError::Fatal)
            .attach_printable(format!("fatal error: {reason}"))
    }
}

pub trait SinkConnectorErrorReportExt {
    fn configuration(self, reason: &str) -> Report<SinkConnectorError>;
    fn temporary(self, reason: &str) -> Report<SinkConnectorError>;
    fn transport(self, reason: &str) -> Report<SinkConnectorError>;
    fn fatal(self, reason: &str) -> Report<SinkConnectorError>;
}

impl<C> SinkConnectorErrorReportExt for Report<C> {
    fn configuration(self, reason: &str) -> Report<SinkConnectorError> {
        self.change_context(SinkConnectorError::Configuration)
            .attach_printable(format!("configuration error: {reason}"))
    }

    fn temporary(self, reason: &str) -> Report<SinkConnectorError> {
        self.change_context(SinkConnectorError::Temporary)
            .attach_printable(format!("temporary error: {reason}"))
    }

    fn transport(self, reason: &str) -> Report<SinkConnectorError> {
        self.change_context(SinkConnectorError::Transport)
            .attach_printable(format!("transport error: {reason}"))
    }

    fn fatal(self, reason: &str) -> Report<SinkConnectorError> {
        self.change_context(SinkConnectorError::Fatal)
            .attach_printable(format!("fatal error: {reason}"))
    }
}
