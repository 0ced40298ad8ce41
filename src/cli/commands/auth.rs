//! Auth command implementation: store, show, or clear the Remote
//! credential in the global config file (mode 0600).

use crate::cli::AuthArgs;
use crate::cli::commands::{self};
use crate::config::{self};
use crate::error::{LbError, Result};
use crate::remote::RemoteClient;
use std::io::{BufRead, IsTerminal, Write};

/// Execute the auth command.
///
/// # Errors
///
/// Returns an error on I/O failure; a failed verification is a warning,
/// not a failure (the credential may be for a currently-unreachable
/// Remote).
pub fn execute(args: &AuthArgs, json: bool) -> Result<()> {
    let global_path = config::global_config_path()
        .ok_or_else(|| LbError::Config("cannot determine home directory".to_string()))?;
    let mut global = config::load_config_file(&global_path)?;

    if args.show {
        let masked = global.api_key.as_deref().map(mask);
        if json {
            return commands::print_json(&serde_json::json!({
                "api_key": masked,
                "team_key": global.team_key,
            }));
        }
        match masked {
            Some(masked) => println!("api_key: {masked}"),
            None => println!("No credential stored"),
        }
        if let Some(team) = &global.team_key {
            println!("team_key: {team}");
        }
        return Ok(());
    }

    if args.clear {
        global.api_key = None;
        config::save_global_config(&global)?;
        if json {
            return commands::print_json(&serde_json::json!({ "cleared": true }));
        }
        println!("Credential cleared");
        return Ok(());
    }

    if let Some(team) = &args.team {
        global.team_key = Some(team.clone());
    }

    let key = match &args.key {
        Some(key) => key.clone(),
        None => prompt_key()?,
    };
    if key.trim().is_empty() {
        return Err(LbError::validation("key", "API key cannot be empty"));
    }
    global.api_key = Some(key.trim().to_string());
    config::save_global_config(&global)?;

    // Best-effort verification; storing still succeeded if this fails.
    match RemoteClient::new(global.api_key.as_deref().unwrap_or_default())
        .and_then(|client| client.viewer())
    {
        Ok(viewer) => {
            if json {
                return commands::print_json(&serde_json::json!({
                    "stored": true,
                    "user": viewer,
                }));
            }
            println!("Authenticated as {} <{}>", viewer.name, viewer.email);
        }
        Err(e) => {
            eprintln!("warning: credential stored but verification failed: {e}");
            if json {
                return commands::print_json(&serde_json::json!({
                    "stored": true,
                    "verified": false,
                }));
            }
        }
    }
    Ok(())
}

fn mask(key: &str) -> String {
    if key.len() <= 12 {
        return "…".to_string();
    }
    format!("{}…{}", &key[..8], &key[key.len() - 4..])
}

fn prompt_key() -> Result<String> {
    if !std::io::stdin().is_terminal() {
        // Piped input: read the key from stdin without a prompt.
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        return Ok(line);
    }
    eprint!("API key: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_short_and_long() {
        assert_eq!(mask("short"), "…");
        let masked = mask("lin_api_0123456789abcdef");
        assert!(masked.starts_with("lin_api_"));
        assert!(masked.ends_with("cdef"));
        assert!(masked.contains('…'));
    }
}
