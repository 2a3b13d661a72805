//! Command-channel handlers.

use std::time::Duration;

use railsync_core::{ChannelState, LogCategory, SyncConfig, SyncSession};
use tokio::time::timeout;
use tracing::debug;

use crate::cli::{GlobalOpts, PowerArg, PowerArgs};
use crate::error::CliError;

use super::report_status;

/// Open the command channel, post the power request, and wait until the
/// frame has actually been written before tearing the session down.
pub async fn handle_power(
    mut config: SyncConfig,
    args: &PowerArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    config.event_stream_enabled = false;
    config.command_channel_enabled = true;
    let wait = config.timeout;

    let session = SyncSession::new(config)?;
    session.start().await?;
    let result = send_power(&session, args, wait).await;
    session.shutdown().await;
    result?;

    report_status(&session, global);
    Ok(())
}

async fn send_power(
    session: &SyncSession,
    args: &PowerArgs,
    wait: Duration,
) -> Result<(), CliError> {
    let mut state = session
        .subscribe_channel_state()
        .await
        .ok_or(CliError::ChannelNotOpen)?;
    timeout(wait, state.wait_for(|s| *s == ChannelState::Open))
        .await
        .map_err(|_| CliError::Timeout {
            what: "Opening the command channel".into(),
            seconds: wait.as_secs(),
        })?
        .map_err(|_| CliError::ChannelNotOpen)?;

    let mut log = session.store().subscribe_channel_log();
    let id = session.set_power(&args.id, args.state == PowerArg::On).await?;
    debug!(request = %id, "power request queued");

    timeout(
        wait,
        log.wait_for(|entries| {
            entries
                .iter()
                .any(|e| e.category == LogCategory::Out && e.text.contains(&id))
        }),
    )
    .await
    .map_err(|_| CliError::Timeout {
        what: "Sending the power request".into(),
        seconds: wait.as_secs(),
    })?
    .map_err(|_| CliError::ChannelNotOpen)?;
    Ok(())
}
