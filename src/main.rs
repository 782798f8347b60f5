use std::sync::Arc;

use shard_handoff::{
    config::Config,
    middleware,
    service::{proxy::LocalProxy, Service},
};

#[macro_use]
extern crate log;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "shard_handoff=info");
    }
    env_logger::init();

    // Env config
    let cfg = Config::from_env();

    if !cfg.enabled {
        info!("Seamless shard transfer disabled in config (SHARDING_ENABLED=false)");
        info!("Players will see loading screens on shard transfers");
        return Ok(());
    }

    // Standalone proxy host with the configured backend servers
    let (proxy, events) = LocalProxy::new();
    for shard in cfg.servers() {
        proxy.register_server(shard);
    }
    let proxy = Arc::new(proxy);

    let mut service = match Service::new(&cfg, proxy) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to initialize, seamless transfers DISABLED: {}", e);
            error!("Players will see loading screens on shard transfers");
            return Ok(());
        }
    };

    info!("Seamless shard transfer enabled!");
    info!("Pre-load delay: {}ms", cfg.preload_delay);

    // Run until finished
    service
        .run(events, middleware::transfer_request_interceptor)
        .await
}
