use redis_rust::server::{listener, RedisServer, ServerConfig};
use std::path::PathBuf;
use tracing::info;

/// Builds the config `main` starts from. No config-file parsing lives in the
/// core (§1.1) -- these are the handful of knobs a test harness or a wrapper
/// script needs to vary without one, read straight from the environment.
fn config_from_env() -> ServerConfig {
    let mut config = ServerConfig::default();
    if let Ok(port) = std::env::var("REDIS_RUST_PORT") {
        if let Ok(p) = port.parse() {
            config.port = p;
        }
    }
    if let Ok(bind) = std::env::var("REDIS_RUST_BIND") {
        config.bind = bind;
    }
    if let Ok(path) = std::env::var("REDIS_RUST_AOF_PATH") {
        config.aof_path = PathBuf::from(path);
    }
    if let Ok(flag) = std::env::var("REDIS_RUST_AOF_ENABLED") {
        config.aof_enabled = flag != "no" && flag != "0";
    }
    if let Ok(flag) = std::env::var("REDIS_RUST_PROTECTED_MODE") {
        config.protected_mode = flag != "no" && flag != "0";
    }
    if let Ok(pass) = std::env::var("REDIS_RUST_REQUIREPASS") {
        config.requirepass = Some(pass);
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let config = config_from_env();
    info!("redis-rust starting, binding {}", config.addr());
    info!("AOF enabled: {}", config.aof_enabled);

    let server = RedisServer::new(config).await?;
    listener::run(server).await?;

    Ok(())
}
