// Background expiry sweeper (§4.8). Wakes once a second, evicts every key
// past its deadline under the write lock, and stages `SELECT n`/`DEL key`
// into the stage buffer of whichever DB the eviction actually happened in
// -- not the currently-selected DB (§9: the source's bug, fixed here).

use crate::persistence::aof;
use crate::protocol::serializer::write_command_slices;
use crate::server::RedisServer;
use std::sync::Arc;
use std::time::Duration;

pub async fn run_sweeper(server: Arc<RedisServer>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;

        let any_evicted = {
            let mut guard = server.state.write().await;
            let db_count = guard.dbs.len();
            let mut any = false;
            for i in 0..db_count {
                let expired = guard.dbs[i].sweep_expired();
                if expired.is_empty() {
                    continue;
                }
                any = true;
                let num_s = i.to_string();
                write_command_slices(&mut guard.dbs[i].aof_stage, &[b"SELECT", num_s.as_bytes()]);
                for key in &expired {
                    write_command_slices(&mut guard.dbs[i].aof_stage, &[b"DEL", key.as_ref()]);
                }
            }
            any
        };

        if any_evicted {
            if let Err(e) = aof::flush_aof(&server, 0).await {
                server.post_fatal_io("expire sweeper flush", &e).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use crate::storage::Value;
    use bytes::Bytes;
    use std::time::Instant;

    #[tokio::test]
    async fn sweeper_stages_del_into_the_db_the_key_lived_in() {
        let config = ServerConfig {
            databases: 2,
            aof_enabled: false,
            ..ServerConfig::default()
        };
        let server = RedisServer::new(config).await.expect("server init");
        {
            let mut guard = server.state.write().await;
            guard.dbs[1].set_with_expiry(
                Bytes::from_static(b"k"),
                Value::Str(Bytes::from_static(b"v")),
                Instant::now() - Duration::from_millis(1),
            );
        }

        {
            let mut guard = server.state.write().await;
            let db_count = guard.dbs.len();
            for i in 0..db_count {
                let expired = guard.dbs[i].sweep_expired();
                for key in &expired {
                    let num_s = i.to_string();
                    write_command_slices(&mut guard.dbs[i].aof_stage, &[b"SELECT", num_s.as_bytes()]);
                    write_command_slices(&mut guard.dbs[i].aof_stage, &[b"DEL", key.as_ref()]);
                }
            }
        }

        let guard = server.state.read().await;
        assert!(guard.dbs[0].aof_stage.is_empty());
        assert!(!guard.dbs[1].aof_stage.is_empty());
    }
}
