//! Throttle command handler: open, drive, and optionally release a train.

use std::fmt::Write as _;

use railsync_core::{FocusedThrottle, SyncSession};

use crate::cli::{GlobalOpts, ThrottleArgs};
use crate::error::CliError;
use crate::output;

use super::report_status;

pub async fn handle(
    session: &SyncSession,
    args: &ThrottleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.open_throttle(args.address, args.long).await?;

    if let Some(percent) = args.speed {
        session.set_speed_percent(percent).await?;
    }

    let want_forward = if args.reverse {
        Some(false)
    } else if args.forward {
        Some(true)
    } else {
        None
    };
    if let Some(forward) = want_forward {
        let current = session.store().focused_throttle().map(|f| f.state.forward);
        if current != Some(forward) {
            session.toggle_direction().await?;
        }
    }

    for &(number, on) in &args.functions {
        session.set_function(number, on).await?;
    }

    let snapshot = session.store().focused_throttle();

    if args.close {
        session.close_throttle().await?;
    }
    report_status(session, global);

    let Some(throttle) = snapshot else {
        return Err(CliError::NoThrottle);
    };
    let out = output::render_single(global.output, &throttle, detail, |t| {
        t.throttle_id.clone().unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(throttle: &FocusedThrottle) -> String {
    let state = &throttle.state;
    let mut out = String::new();
    let _ = writeln!(out, "Train:      {}", throttle.key);
    if let Some(ref id) = throttle.throttle_id {
        let _ = writeln!(out, "Throttle:   {id}");
    }
    if let Some(ref conn) = throttle.connection_id {
        let _ = writeln!(out, "Connection: {conn}");
    }
    let _ = writeln!(out, "Speed:      {}%", state.speed_percent());
    let _ = writeln!(
        out,
        "Direction:  {}",
        if state.forward { "forward" } else { "reverse" }
    );
    let active: Vec<String> = state
        .functions
        .iter()
        .filter(|(_, on)| **on)
        .map(|(n, _)| format!("F{n}"))
        .collect();
    let _ = write!(
        out,
        "Functions:  {}",
        if active.is_empty() {
            "none".to_owned()
        } else {
            active.join(" ")
        }
    );
    out
}

#[cfg(test)]
mod tests {
    use railsync_core::{ThrottleKey, ThrottlePatch};

    use super::*;

    #[test]
    fn detail_lists_active_functions() {
        let mut throttle =
            FocusedThrottle::new(ThrottleKey::new(1234, true), Some("cs1:1234:true".into()));
        throttle.state.apply(&ThrottlePatch::function(0, true));
        throttle.state.apply(&ThrottlePatch::function(5, true));
        throttle.state.apply(&ThrottlePatch::function(2, false));
        throttle.state.apply(&ThrottlePatch::speed(0.5));

        let text = detail(&throttle);
        assert!(text.contains("Train:      1234 (long)"), "{text}");
        assert!(text.contains("Connection: cs1"), "{text}");
        assert!(text.contains("Speed:      50%"), "{text}");
        assert!(text.ends_with("Functions:  F0 F5"), "{text}");
    }
}
