// handlepool demo binary - exercises the pool, registry, and reaper end to end.
// The actual library is in lib.rs.

use std::sync::Arc;
use std::time::Duration;

use handlepool::{
    BoxError, Config, ConfigValue, PoolConfiguration, Registry, RegistryOptions, ResourcePool,
};

#[derive(Debug)]
struct ModelClient {
    endpoint: String,
}

fn endpoint_of(config: &Config) -> String {
    match config.get("endpoint") {
        Some(ConfigValue::Str(url)) => url.clone(),
        _ => "https://example.test/v1".to_string(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== handlepool demo ===");

    let pool = Arc::new(ResourcePool::new(
        PoolConfiguration::default()
            .with_ttl(Duration::from_secs(60))
            .with_cleanup_interval(Duration::from_secs(5))
            .with_max_idle_size(8),
    ));
    let reaper = pool.start_reaper();

    let mut config = Config::new();
    config.insert("endpoint".into(), ConfigValue::Str("https://example.test/v1".into()));
    config.insert("temperature".into(), ConfigValue::Float(0.7));

    {
        let handle = pool
            .acquire(&config, |c| {
                Ok(ModelClient {
                    endpoint: endpoint_of(c),
                })
            })
            .expect("demo constructor is infallible");
        if let Some(client) = handle.get() {
            println!("  checked out client for {}", client.endpoint);
        }
        println!("  fingerprint: {}", handle.fingerprint());
    }
    println!("  idle after return: {}", pool.idle_count());

    // Registry side: one factory per logical name, ids keyed by (name, config).
    let registry: Registry<ModelClient> = Registry::new(RegistryOptions::default());
    let pool_for_factory = Arc::clone(&pool);
    registry.install_factory("chat", move |c: &Config| -> Result<ModelClient, BoxError> {
        let handle = pool_for_factory
            .acquire(c, |c| {
                Ok(ModelClient {
                    endpoint: endpoint_of(c),
                })
            })
            .map_err(|e| -> BoxError { Box::new(e) })?;
        let endpoint = handle
            .get()
            .map(|client| client.endpoint.clone())
            .unwrap_or_default();
        Ok(ModelClient { endpoint })
    });

    let id = registry
        .register("chat", &config)
        .expect("factory installed above");
    let client = registry.create(&id).expect("factory succeeds");
    println!("  registry built client for {}", client.endpoint);
    println!("  pool stats: {:?}", pool.stats());
    println!("  registry stats: {:?}", registry.stats());

    reaper.shutdown().await;
}
