pub mod download;
pub mod teams;
pub mod upload;

use tracing::{error, info, warn};
use xmit_protocol::wire::ServerNotes;
use xmit_types::{Result, XmitError};

/// Surface a response's notes to the user, then fail if the server reported
/// an unsuccessful operation. Warnings and messages never affect success.
pub(crate) fn check_response(notes: &ServerNotes<'_>) -> Result<()> {
    for err in notes.errors {
        error!("server: {err}");
    }
    for warning in notes.warnings {
        warn!("server: {warning}");
    }
    for message in notes.messages {
        info!("server: {message}");
    }
    if notes.success {
        Ok(())
    } else {
        Err(XmitError::Server(notes.errors.to_vec()))
    }
}
