//! CLI configuration: a thin layer over `railsync_config` that applies
//! `GlobalOpts` flag overrides (--controller, --insecure, --timeout).

use railsync_config::{Config, Profile, config_path, load_config_or_default};
use railsync_core::SyncConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `SyncConfig` from the config file, the active profile, and CLI
/// overrides. Flags win over profile values.
pub fn build_sync_config(global: &GlobalOpts) -> Result<SyncConfig, CliError> {
    let cfg = load_config_or_default();
    resolve(global, &cfg)
}

fn resolve(global: &GlobalOpts, cfg: &Config) -> Result<SyncConfig, CliError> {
    let name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        // No profile: run from flags / env alone.
        None if global.controller.is_some() => Profile::default(),
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(ref controller) = global.controller {
        profile.controller.clone_from(controller);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    Ok(railsync_config::profile_to_sync_config(
        &profile,
        &cfg.defaults,
    )?)
}
