use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use controller::images::NoImages;
use controller::{
    ChannelNotificationBus, Compute, ComputeContext, ConfigManager, DirectoryImageScanner,
    ImageScanner, Notification, PersistenceTrigger, VERSION,
};

/// Settings are loaded from files only, so a save request is just reported
struct LogPersistence;

impl PersistenceTrigger for LogPersistence {
    fn save(&self) {
        info!("Compute settings changed, persistence requested");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("controller=info".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("tungstenite=warn".parse()?)
        .add_directive("tokio_tungstenite=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting compute controller {}", VERSION);

    let config_dir = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let config_manager = ConfigManager::new(config_dir).await?;
    let config = config_manager.get_current_config();

    let images: Arc<dyn ImageScanner> = match &config.images_path {
        Some(path) => {
            info!("Local images served from {}", path.display());
            Arc::new(DirectoryImageScanner::new(path))
        }
        None => Arc::new(NoImages),
    };

    let (bus, mut notifications) = ChannelNotificationBus::new();
    let context = ComputeContext {
        notification: Arc::new(bus),
        persistence: Arc::new(LogPersistence),
        images,
        local_compute_enabled: config.local_compute_enabled,
    };

    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification {
                Notification::Emit { event, payload } => {
                    info!("{}: {}", event, payload);
                }
                Notification::Dispatch {
                    action,
                    payload,
                    compute_id,
                } => {
                    debug!("{} from compute {}: {}", action, compute_id, payload);
                }
            }
        }
    });

    let mut computes = Vec::new();
    for (key, settings) in &config.computes {
        match Compute::new(settings.clone(), context.clone()) {
            Ok(compute) => computes.push(compute),
            Err(e) => error!("Compute {} rejected: {}", key, e),
        }
    }

    let results = join_all(computes.iter().map(|compute| compute.connect())).await;
    for (compute, result) in computes.iter().zip(results) {
        match result {
            Ok(()) => info!(
                "Compute {} ready (version {})",
                compute.name().await,
                compute.version().await.unwrap_or_default()
            ),
            Err(e) => warn!("Compute {} unavailable: {}", compute.name().await, e),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    for compute in &computes {
        compute.close().await;
    }

    Ok(())
}
