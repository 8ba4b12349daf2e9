use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::collectors::platform::InterfaceQuery;
use crate::run::RunController;
use crate::settings::SettingsSource;
use crate::web::create_router;

pub struct CommandHandler {
    query: Arc<dyn InterfaceQuery>,
}

impl CommandHandler {
    pub fn new(query: Arc<dyn InterfaceQuery>) -> Self {
        Self { query }
    }

    pub async fn serve(&self, settings_path: PathBuf, host: Option<String>, port: Option<u16>) -> Result<()> {
        let source = SettingsSource::new(settings_path);
        let settings = source.load();
        let host = host.unwrap_or(settings.web_host);
        let port = port.unwrap_or(settings.web_port);

        let controller_settings = source.path().to_path_buf();
        let controller = Arc::new(RunController::new(Arc::clone(&self.query), source));
        let app = create_router(controller);

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("Failed to bind {host}:{port}"))?;
        info!(
            "Listening on http://{} (settings from {})",
            listener.local_addr()?,
            controller_settings.display()
        );

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")
    }

    pub async fn interfaces(&self) -> Result<()> {
        let interfaces = self.query.list_interfaces().await;
        if interfaces.is_empty() {
            println!("No interfaces found");
        }
        for name in interfaces {
            println!("{name}");
        }
        Ok(())
    }

    pub async fn stats(&self, iface: &str) -> Result<()> {
        let (link, counters) = tokio::join!(self.query.link_info(iface), self.query.counters(iface));
        let report = serde_json::json!({
            "iface": iface,
            "link": link,
            "counters": counters,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
