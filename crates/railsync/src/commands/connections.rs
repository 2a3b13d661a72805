//! Connection registry, system, and port command handlers.

use std::sync::Arc;

use tabled::Tabled;

use railsync_core::{
    ConnectionRecord, ConnectionTarget, CreateConnection, PowerStatus, Role, SyncSession,
    SystemDescriptor,
};

use crate::cli::{CreateArgs, GlobalOpts, RoleArg, SetRoleArgs};
use crate::error::CliError;
use crate::output;

use super::report_status;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "System")]
    system: String,
    #[tabled(rename = "Connected")]
    connected: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Roles")]
    roles: String,
    #[tabled(rename = "Command Station")]
    station: String,
}

impl From<&Arc<ConnectionRecord>> for ConnectionRow {
    fn from(c: &Arc<ConnectionRecord>) -> Self {
        Self {
            id: c.id.clone(),
            system: c.system_type.clone(),
            connected: if c.connected { "yes" } else { "no" }.into(),
            power: c.power_status.unwrap_or(PowerStatus::Unknown).to_string(),
            roles: c
                .roles
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            station: c
                .command_station
                .as_ref()
                .map(railsync_core::CommandStation::summary)
                .unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct SystemRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Connection Types")]
    types: String,
}

impl From<&SystemDescriptor> for SystemRow {
    fn from(s: &SystemDescriptor) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            types: s.connection_types.join(", "),
        }
    }
}

#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "Port")]
    port: String,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(session: &SyncSession, global: &GlobalOpts) -> Result<(), CliError> {
    session.refresh_connections().await?;
    let snapshot = session.store().connections_snapshot();
    let out = output::render_list(
        global.output,
        snapshot.as_slice(),
        |c| ConnectionRow::from(c),
        |c| c.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn systems(session: &SyncSession, global: &GlobalOpts) -> Result<(), CliError> {
    session.load_systems().await?;
    let systems = session.store().systems();
    let out = output::render_list(
        global.output,
        systems.as_slice(),
        |s| SystemRow::from(s),
        |s| s.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn ports(session: &SyncSession, global: &GlobalOpts) -> Result<(), CliError> {
    session.refresh_ports().await?;
    let ports = session.store().ports();
    let out = output::render_list(
        global.output,
        ports.as_slice(),
        |p| PortRow { port: p.clone() },
        Clone::clone,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Send the version request, give the station time to answer, then show
/// what the registry reports.
pub async fn request_version(
    session: &SyncSession,
    id: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.request_version(id).await?;
    report_status(session, global);

    tokio::time::sleep(session.config().request_version_refresh_delay).await;
    session.refresh_connections().await?;
    session.shutdown().await;

    let station = session
        .store()
        .connection(id)
        .and_then(|c| c.command_station.clone());
    match station {
        Some(station) => {
            let out = output::render_single(
                global.output,
                &station,
                |s| format!("{id}: {}", s.summary()),
                railsync_core::CommandStation::summary,
            )?;
            output::print_output(&out, global.quiet);
        }
        None if !global.quiet => eprintln!("{id}: no version reported yet"),
        None => {}
    }
    Ok(())
}

pub async fn set_role(
    session: &SyncSession,
    args: &SetRoleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let role = match args.role {
        RoleArg::Throttles => Role::Throttles,
        RoleArg::Accessories => Role::Accessories,
    };
    session.set_role(&args.id, role, !args.disable).await?;
    report_status(session, global);
    Ok(())
}

pub async fn create(
    session: &SyncSession,
    args: &CreateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let target = match (&args.host, args.port, &args.serial_port) {
        (Some(host), Some(port), _) => ConnectionTarget::Network {
            host: host.clone(),
            port,
        },
        (_, _, Some(port_name)) => ConnectionTarget::Serial {
            port_name: port_name.clone(),
            baud_rate: args.baud,
            flow_control: args.flow_control.clone(),
        },
        _ => {
            return Err(CliError::Validation {
                field: "target".into(),
                reason: "pass --host and --port, or --serial-port".into(),
            });
        }
    };

    let request = CreateConnection {
        id: args.id.clone(),
        system_type: args.system.clone(),
        user_name: args.user_name.clone(),
        system_prefix: args.prefix.clone(),
        target,
    };
    session.create_connection(&request).await?;
    report_status(session, global);
    Ok(())
}
