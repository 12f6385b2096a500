use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use buzznet::config::{Cli, Command, Config};
use buzznet::db;
use buzznet::posts::{
    Field, HttpRemoteClient, LocalFallbackStore, PostForm, SqliteFallbackStore,
    SubmissionOrchestrator,
};
use buzznet::routes;
use buzznet::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    match cli.command {
        Command::Serve { .. } => serve(config).await,
        Command::Post {
            title,
            content,
            author,
        } => post(config, title, content, author).await,
        Command::Pending => pending(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool, db::SERVER_MIGRATIONS)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = routes::build_router(AppState { db: pool, config });

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn open_local_store(config: &Config) -> anyhow::Result<SqliteFallbackStore> {
    let pool = db::create_pool(&config.local_storage_path())?;
    db::run_migrations(&pool, db::LOCAL_STORE_MIGRATIONS)?;
    Ok(SqliteFallbackStore::new(pool))
}

async fn post(config: Config, title: String, content: String, author: String) -> anyhow::Result<()> {
    let remote = HttpRemoteClient::new(&config.remote)?;
    let store = open_local_store(&config)?;
    let orchestrator = SubmissionOrchestrator::new(Arc::new(remote), Arc::new(store));

    let form = PostForm::new(Arc::new(orchestrator));
    form.set_field(Field::Title, title);
    form.set_field(Field::Content, content);
    form.set_field(Field::Author, author);

    let completion = form.submit().await;
    match completion.record() {
        Some(record) => {
            println!("{}: {}", record.id, completion.message());
            Ok(())
        }
        None => anyhow::bail!("{}", completion.message()),
    }
}

async fn pending(config: Config) -> anyhow::Result<()> {
    let store = open_local_store(&config)?;
    let queued = store.list_all().await?;

    if queued.is_empty() {
        println!("No posts waiting to be sent");
        return Ok(());
    }

    for record in queued {
        println!(
            "{}  {}  {} by {}",
            record.id,
            record.created_at.to_rfc3339(),
            record.title,
            record.author
        );
    }
    Ok(())
}
