mod config;
mod dashboard;
mod pools;
mod regime;
mod store;
mod tasks;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::{config::Settings, store::CsvStore, tasks::TaskClient};

#[derive(Debug, Parser)]
#[command(name = "quantboard", version)]
struct Cli {
    /// Override QUANT_DATA_ROOT
    #[arg(long)]
    data_root: Option<String>,
    /// Override DASHBOARD_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(root) = cli.data_root {
        settings.data_root = root;
    }
    if let Some(port) = cli.port {
        settings.dashboard_port = port;
    }
    settings.validate()?;

    let store = CsvStore::new(&settings.data_root);
    let tasks = TaskClient::new(
        &settings.task_api_base,
        Duration::from_secs(settings.task_timeout_secs),
    )?;

    log::info!(
        "app.start data_root={} task_api={} windows={}d/{}d",
        store.root().display(),
        tasks.base(),
        settings.distribution_window,
        settings.history_window,
    );

    if settings.dashboard_open_browser {
        let url = format!(
            "http://{}:{}/",
            settings.dashboard_host, settings.dashboard_port
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(650)).await;
            let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        });
    }

    dashboard::serve(settings, store, tasks).await?;
    Ok(())
}
