// `MONITOR` and `CLIENT` (§4.9.1). `MONITOR` just flips a per-connection
// flag -- the actual fan-out lives in `RedisServer::broadcast_monitor` and
// the connection driver's `monitor_rx` select arm. `CLIENT` is limited to
// `SETNAME`/`GETNAME`/`LIST`/`ID`; `PAUSE`/`UNPAUSE`/`KILL` and the
// cluster/ACL-flavored subcommands are out of scope.

use crate::protocol::Reply;
use crate::server::client_info::ClientState;
use crate::server::ServerState;
use bytes::Bytes;

use super::dispatcher::CommandOutcome;

pub fn cmd_monitor(client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 1 {
        return CommandOutcome::error(Reply::err_arity("MONITOR"));
    }
    client.monitor = true;
    CommandOutcome::simple(Reply::ok())
}

pub fn cmd_client(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("CLIENT"));
    }
    let sub = argv[1].to_ascii_uppercase();
    match sub.as_slice() {
        b"SETNAME" => {
            if argv.len() != 3 {
                return CommandOutcome::error(Reply::err_arity("CLIENT"));
            }
            if argv[2].iter().any(|b| *b == b' ' || *b == b'\n') {
                return CommandOutcome::error(Reply::err("Client names cannot contain spaces, newlines or special characters."));
            }
            let name = String::from_utf8_lossy(&argv[2]).to_string();
            client.name = Some(argv[2].clone());
            state.clients.set_name(client.id, name);
            CommandOutcome::simple(Reply::ok())
        }
        b"GETNAME" => match &client.name {
            Some(name) => CommandOutcome::simple(Reply::bulk(name)),
            None => CommandOutcome::simple(Reply::null_bulk()),
        },
        b"LIST" => {
            if argv.len() != 2 {
                return CommandOutcome::error(Reply::err_arity("CLIENT"));
            }
            let listing = state.clients.list();
            CommandOutcome::simple(Reply::bulk(listing.as_bytes()))
        }
        b"ID" => {
            if argv.len() != 2 {
                return CommandOutcome::error(Reply::err_arity("CLIENT"));
            }
            CommandOutcome::simple(Reply::integer(client.id as i64))
        }
        _ => CommandOutcome::error(Reply::err(&format!(
            "Unknown CLIENT subcommand or wrong number of arguments for '{}'",
            String::from_utf8_lossy(&argv[1])
        ))),
    }
}
