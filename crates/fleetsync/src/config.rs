//! CLI configuration: a thin wrapper around `fleetsync_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--channel-url, --store-url, --token, --admin).

use secrecy::SecretString;

use fleetsync_core::FleetConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use fleetsync_config::{
    Config, Profile, config_path, load_config, load_config_or_default, save_config,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the runtime `FleetConfig` for this invocation.
///
/// Flags override the profile. Without a matching profile, both URLs and
/// the token must come from flags or their environment variables.
pub fn build_fleet_config(global: &GlobalOpts, config: &Config) -> Result<FleetConfig, CliError> {
    let name = active_profile_name(global, config);
    let stored = config.profiles.get(&name);

    if stored.is_none() && global.profile.is_some() {
        let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
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

    let mut profile = stored.cloned().unwrap_or_default();
    if let Some(ref url) = global.channel_url {
        profile.channel_url.clone_from(url);
    }
    if let Some(ref url) = global.store_url {
        profile.store_url.clone_from(url);
    }
    if global.admin {
        profile.admin = true;
    }

    if profile.channel_url.is_empty() || profile.store_url.is_empty() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }

    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => fleetsync_config::resolve_token(&profile, &name)?,
    };

    Ok(fleetsync_config::fleet_config_with_token(&profile, token)?)
}
