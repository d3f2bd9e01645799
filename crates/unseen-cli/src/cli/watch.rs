use anyhow::{Context, Result};
use unseen_core::snapshot::{HttpLoaderConfig, HttpSnapshotLoader};
use unseen_core::source::SocketEventSource;
use unseen_core::EngineRuntime;

use super::config::CliConfig;
use super::render::{write_view, OutputFormat};

/// The `api` section, with the engine's tenant filled in when the section
/// does not set one.
fn loader_config(config: &CliConfig) -> Result<HttpLoaderConfig> {
    let mut api = config
        .api
        .clone()
        .context("watch requires an api section in the config file")?;
    if api.tenant_id.is_none() {
        api.tenant_id = config.engine.tenant_id.clone();
    }
    Ok(api)
}

/// Mount the engine against the live relay socket and conversations API,
/// printing every published view until Ctrl-C.
pub async fn run_watch(config: CliConfig, format: OutputFormat) -> Result<()> {
    let socket_path = config
        .socket_path
        .clone()
        .context("watch requires socketPath in the config file")?;
    let api = loader_config(&config)?;

    let runtime = EngineRuntime::new(
        config.engine,
        SocketEventSource::new(&socket_path),
        HttpSnapshotLoader::new(api),
    )?;
    let mount = runtime.mount()?;
    let mut views = mount.handle().subscribe_view();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("shutting down");
                break;
            }
            changed = views.changed() => {
                if changed.is_err() {
                    tracing::warn!("engine stopped publishing views");
                    break;
                }
                let view = views.borrow_and_update().clone();
                let stdout = std::io::stdout();
                write_view(&mut stdout.lock(), None, &view, format)?;
            }
        }
    }

    mount.unmount().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use unseen_core::EngineConfig;

    #[tokio::test]
    async fn test_watch_requires_transport_config() {
        let config = CliConfig::new(EngineConfig::new("staff-1"));
        let err = run_watch(config, OutputFormat::Text).await.unwrap_err();
        assert!(err.to_string().contains("socketPath"));
    }

    #[test]
    fn test_loader_inherits_engine_tenant() {
        let config = CliConfig::from_json(
            r#"{"staffId": "s1", "tenantId": "hotel-1", "api": {"baseUrl": "https://api.example.com"}}"#,
        )
        .unwrap();
        assert_eq!(loader_config(&config).unwrap().tenant_id.as_deref(), Some("hotel-1"));

        let config = CliConfig::from_json(
            r#"{"staffId": "s1", "tenantId": "hotel-1", "api": {"baseUrl": "https://api.example.com", "tenantId": "hotel-2"}}"#,
        )
        .unwrap();
        assert_eq!(loader_config(&config).unwrap().tenant_id.as_deref(), Some("hotel-2"));

        let config = CliConfig::from_json(r#"{"staffId": "s1"}"#).unwrap();
        assert!(loader_config(&config).is_err());
    }
}
