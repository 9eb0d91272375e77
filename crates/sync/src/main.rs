use std::sync::Arc;

use futures::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskdeck_sync::db::Cache;
use taskdeck_sync::notify::{NoticeLevel, Notifier};
use taskdeck_sync::store::AuthStore;
use taskdeck_sync::{ApiClient, Config, SyncSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskdeck_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    // Open the degraded-mode cache
    let cache = Cache::open(&config.cache_url).await?;

    let api = ApiClient::new(&config.api_url);
    let auth = AuthStore::new(Arc::new(api.clone()), Some(cache), Notifier::new());

    let user = match &config.token {
        Some(token) => auth.adopt_token(token).await?,
        None => match auth.restore().await? {
            Some(user) => user,
            None => anyhow::bail!("no session: set TASKDECK_TOKEN or sign in first"),
        },
    };
    let settings = auth.load_settings().await;
    tracing::info!(
        user = %user.email,
        columns = settings.custom_columns.len(),
        categories = settings.categories.len(),
        "session restored"
    );

    let session = SyncSession::start(&config, api, user).await;

    let mut notices = BroadcastStream::new(session.notifier().subscribe());
    let mut tasks = WatchStream::new(session.tasks().subscribe());
    let mut connection = WatchStream::new(session.socket().watch_state());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(Ok(notice)) = notices.next() => match notice.level {
                NoticeLevel::Error => tracing::error!(kind = ?notice.kind, "{}", notice.message),
                _ => tracing::info!("{}", notice.message),
            },
            Some(revision) = tasks.next() => {
                let count = session.tasks().tasks().await.len();
                tracing::info!(revision, count, "tasks changed");
            }
            Some(state) = connection.next() => {
                tracing::info!(?state, "socket state");
            }
        }
    }

    tracing::info!("Shutting down");
    session.shutdown().await;
    Ok(())
}
