// `CONFIG` (§4.9, §6): limited to the four keys the core actually owns
// (`port`, `bind`, `protected-mode`, `requirepass`); `CONFIG REWRITE`
// delegates to the external config-file collaborator (§1, §6), which this
// core does not implement.

use crate::protocol::Reply;
use crate::server::client_info::ClientState;
use crate::server::ServerState;
use bytes::Bytes;

use super::dispatcher::CommandOutcome;

fn get_param(state: &ServerState, key: &str) -> Option<String> {
    match key {
        "port" => Some(state.config.port.to_string()),
        "bind" => Some(state.config.bind.clone()),
        "protected-mode" => Some(if state.config.protected_mode { "yes".into() } else { "no".into() }),
        "requirepass" => Some(state.config.requirepass.clone().unwrap_or_default()),
        _ => None,
    }
}

/// `CONFIG SET key value` matches the key name to its own field; unlike the
/// source, `bind` never writes into `port` (§9 decision: the aliasing bug is
/// fixed, not reproduced).
fn set_param(state: &mut ServerState, key: &str, value: &Bytes) -> Result<(), Vec<u8>> {
    let value_str = String::from_utf8_lossy(value).to_string();
    match key {
        "port" => match value_str.parse::<u16>() {
            Ok(p) => {
                state.config.port = p;
                Ok(())
            }
            Err(_) => Err(Reply::err_not_integer()),
        },
        "bind" => {
            state.config.bind = value_str;
            Ok(())
        }
        "protected-mode" => match value_str.to_ascii_lowercase().as_str() {
            "yes" => {
                state.config.protected_mode = true;
                Ok(())
            }
            "no" => {
                state.config.protected_mode = false;
                Ok(())
            }
            _ => Err(Reply::err_syntax()),
        },
        "requirepass" => {
            state.config.requirepass = if value_str.is_empty() { None } else { Some(value_str) };
            Ok(())
        }
        _ => Err(Reply::err(&format!("Unknown CONFIG parameter '{key}'"))),
    }
}

pub fn cmd_config(state: &mut ServerState, _client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("CONFIG"));
    }
    let sub = argv[1].to_ascii_uppercase();
    match sub.as_slice() {
        b"GET" => {
            if argv.len() != 3 {
                return CommandOutcome::error(Reply::err_arity("CONFIG"));
            }
            let key = String::from_utf8_lossy(&argv[2]).to_ascii_lowercase();
            match get_param(state, &key) {
                Some(value) => CommandOutcome::simple(Reply::bulk_array(vec![key.into_bytes(), value.into_bytes()])),
                None => CommandOutcome::simple(Reply::multibulk_header(0)),
            }
        }
        b"SET" => {
            if argv.len() != 4 {
                return CommandOutcome::error(Reply::err_arity("CONFIG"));
            }
            let key = String::from_utf8_lossy(&argv[2]).to_ascii_lowercase();
            // Config changes are runtime-only and never themselves replayed
            // from the AOF, so this reports no dirty writes even though it
            // needs the write lock to mutate `state.config`.
            match set_param(state, &key, &argv[3]) {
                Ok(()) => CommandOutcome::simple(Reply::ok()),
                Err(reply) => CommandOutcome::error(reply),
            }
        }
        b"REWRITE" => CommandOutcome::error(Reply::err("The server is running without a config file")),
        _ => CommandOutcome::error(Reply::err_syntax()),
    }
}
