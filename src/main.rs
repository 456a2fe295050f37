use anyhow::{Context, Result};
use heike_nav::config::Config;
use heike_nav::io::{
    FileHistoryStore, HistoryStore, LocalChannel, LocalStorage, MemoryHistoryStore, Services,
};
use heike_nav::message::{Choice, LogPrompt};
use heike_nav::{EntryKind, TabsManager};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("heike_nav=info")),
        )
        .init();

    if let Err(e) = Config::create_default() {
        tracing::warn!("could not write default config: {}", e);
    }
    let config = Config::load();

    // Start at the given path, else the current directory
    let start = match env::args().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => env::current_dir().context("cannot determine the current directory")?,
    };

    let history: Arc<dyn HistoryStore> = match FileHistoryStore::default_path() {
        Some(path) => Arc::new(FileHistoryStore::open(path, config.history.clone()).await),
        None => Arc::new(MemoryHistoryStore::new(config.history.clone())),
    };
    let services = Services {
        storage: Arc::new(LocalStorage::new()),
        channel: Arc::new(LocalChannel::new()),
        // Non-interactive: notices are logged and questions declined.
        prompt: Arc::new(LogPrompt::new(Choice::Dismissed)),
        history,
    };

    let mut tabs = TabsManager::new(services, config);
    let location = tabs
        .new_tab(&start)
        .await
        .with_context(|| format!("cannot open {}", start.display()))?;
    let explorer = tabs
        .active()
        .context("no tab is open")?;

    println!("{}", explorer.breadcrumbs().await.join(" > "));
    println!("{}", location.path.display());
    for entry in explorer.content().await {
        let marker = match entry.kind {
            EntryKind::Folder => "/",
            EntryKind::File => "",
        };
        println!("  {}{}", entry.name, marker);
    }
    Ok(())
}
