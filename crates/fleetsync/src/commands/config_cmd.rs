//! Config command handlers. None of these need a fleet connection.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let out = toml::to_string_pretty(&cfg)
                .map_err(|e| CliError::Internal(format!("TOML serialization failed: {e}")))?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            name,
            channel,
            store,
            token_env,
            default,
        } => {
            let mut cfg = config::load_config_or_default();
            let profile = Profile {
                channel_url: channel,
                store_url: store,
                admin: global.admin,
                token_env,
                ..Profile::default()
            };
            // Reject URLs the fleet would refuse later.
            fleetsync_config::fleet_config_with_token(
                &profile,
                secrecy::SecretString::from(String::new()),
            )?;

            if default || cfg.profiles.is_empty() {
                cfg.default_profile = Some(name.clone());
            }
            cfg.profiles.insert(name.clone(), profile);
            let path = config::save_config(&cfg)?;
            output::print_output(
                &format!("Profile '{name}' written to {}", path.display()),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let active = config::active_profile_name(global, &cfg);
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort();
            let out = names
                .into_iter()
                .map(|name| {
                    if *name == active {
                        format!("* {name}")
                    } else {
                        format!("  {name}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
