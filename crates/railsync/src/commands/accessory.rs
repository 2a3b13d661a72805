//! Accessory (turnout) command handler.

use railsync_core::{AccessoryId, SyncSession};

use crate::cli::{AccessoryArgs, GlobalOpts, TurnoutState};
use crate::error::CliError;
use crate::output;

use super::report_status;

pub async fn handle(
    session: &SyncSession,
    args: &AccessoryArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let closed = args.state == TurnoutState::Closed;
    session.set_accessory(args.address, closed).await?;
    report_status(session, global);

    if let Some(status) = session
        .store()
        .accessory(&AccessoryId::Address(args.address))
    {
        let out = output::render_single(
            global.output,
            status.as_ref(),
            |s| format!("{}: {}", s.id, s.state),
            |s| s.state.clone(),
        )?;
        output::print_output(&out, global.quiet);
    }
    Ok(())
}
