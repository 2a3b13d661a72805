//! Command handlers, one module per command group.

pub mod accessory;
pub mod channel;
pub mod connections;
pub mod throttle;
pub mod watch;

use railsync_core::{SyncConfig, SyncSession};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Route a parsed command to its handler.
pub async fn dispatch(
    cmd: Command,
    config: SyncConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(config, &args, global).await,
        Command::Power(args) => channel::handle_power(config, &args, global).await,
        other => {
            let session = SyncSession::new(config)?;
            match other {
                Command::Connections => connections::list(&session, global).await,
                Command::Systems => connections::systems(&session, global).await,
                Command::Ports => connections::ports(&session, global).await,
                Command::RequestVersion { id } => {
                    connections::request_version(&session, &id, global).await
                }
                Command::SetRole(args) => connections::set_role(&session, &args, global).await,
                Command::Create(args) => connections::create(&session, &args, global).await,
                Command::Throttle(args) => throttle::handle(&session, &args, global).await,
                Command::Accessory(args) => accessory::handle(&session, &args, global).await,
                Command::Watch(_) | Command::Power(_) | Command::Completions(_) => Err(
                    CliError::Internal("command dispatched to the wrong handler".into()),
                ),
            }
        }
    }
}

/// Report the session's latest status message on stderr.
pub(crate) fn report_status(session: &SyncSession, global: &GlobalOpts) {
    if global.quiet {
        return;
    }
    if let Some(status) = session.store().status() {
        eprintln!(
            "{}",
            output::status_line(&status, output::should_color(global.color))
        );
    }
}
