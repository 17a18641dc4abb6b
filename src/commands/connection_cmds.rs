// Pure-connection commands (§4.9.1): no server lock taken.

use crate::protocol::Reply;
use crate::server::client_info::{AuthStage, ClientState};
use bytes::Bytes;

use super::dispatcher::CommandOutcome;

pub fn cmd_ping(_client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    match argv.len() {
        1 => CommandOutcome::simple(Reply::simple("PONG")),
        2 => CommandOutcome::simple(Reply::bulk(&argv[1])),
        _ => CommandOutcome::error(Reply::err_arity("PING")),
    }
}

pub fn cmd_echo(_client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("ECHO"));
    }
    CommandOutcome::simple(Reply::bulk(&argv[1]))
}

/// `AUTH` needs the configured password, so unlike `PING`/`ECHO` it takes
/// the read lock to see `ServerState::config` (§4.2.1).
pub fn cmd_auth(state: &crate::server::ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("AUTH"));
    }
    match &state.config.requirepass {
        None => CommandOutcome::error(Reply::err("Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?")),
        Some(pw) => {
            if pw.as_bytes() == argv[1].as_ref() {
                client.auth = AuthStage::PasswordChecked;
                CommandOutcome::simple(Reply::ok())
            } else {
                CommandOutcome::error(Reply::err_invalid_password())
            }
        }
    }
}
