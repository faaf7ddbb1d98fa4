use std::sync::Arc;

use shiftpilot::{
    config::AppConfig,
    export::{LogExporter, SheetsWebhookExporter, ShiftExporter},
    http::{self, AppState},
    notify::{LogNotifier, Notifier},
    persistence::SnapshotFile,
    scheduler,
    service::ShiftService,
    speech::{DisabledSpeechAnalyzer, OpenAiSpeechAnalyzer, SpeechAnalyzer},
    storage::{InMemoryShiftRepository, ShiftRepository, SqliteShiftRepository},
    store::ShiftStore,
    telegram_bot::{self, TelegramNotifier},
};
use teloxide::Bot;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let rules = config.shift_rules()?;

    let snapshot_file = SnapshotFile::new(config.snapshot_path.clone());
    let store = ShiftStore::from_snapshot(snapshot_file.load().await);

    let repository = build_repository(&config).await?;
    let exporter = build_exporter(&config);
    let speech = build_speech(&config);
    let bot = config.telegram_token.clone().map(Bot::new);
    let notifier: Arc<dyn Notifier> = match &bot {
        Some(bot) => Arc::new(TelegramNotifier::new(bot.clone())),
        None => Arc::new(LogNotifier),
    };

    let service = Arc::new(ShiftService::new(
        store.clone(),
        repository,
        exporter,
        speech,
        notifier,
        config.keyword_policy(),
        rules.clone(),
    ));

    scheduler::spawn_ticker(service.clone(), rules.tick_interval);
    scheduler::spawn_snapshots(store.clone(), snapshot_file.clone(), rules.snapshot_interval);

    if let Some(bot) = bot {
        let telegram_service = service.clone();
        tokio::spawn(async move {
            telegram_bot::start_telegram_bot(bot, telegram_service).await;
            warn!("Telegram dispatcher stopped");
        });
    } else {
        warn!("TELOXIDE_TOKEN is not set; Telegram bot is disabled");
    }

    let app = http::router(AppState { service });
    let listener = TcpListener::bind(config.http_bind).await?;
    info!("ShiftPilot HTTP API listening on {}", config.http_bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(?error, "failed to listen for shutdown signal");
            }
        })
        .await?;

    scheduler::save_snapshot(&store, &snapshot_file).await;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();
}

async fn build_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn ShiftRepository>> {
    if let Some(database_url) = &config.database_url {
        let repository = SqliteShiftRepository::connect(database_url).await?;
        info!("Connected to SQLite shift repository");
        Ok(Arc::new(repository))
    } else {
        warn!("DATABASE_URL not set; chat settings and history stay in memory");
        Ok(Arc::new(InMemoryShiftRepository::default()))
    }
}

fn build_exporter(config: &AppConfig) -> Arc<dyn ShiftExporter> {
    if let Some(url) = config.export_webhook_url.clone() {
        Arc::new(SheetsWebhookExporter::new(
            url,
            config.export_webhook_token.clone(),
        ))
    } else {
        warn!("EXPORT_WEBHOOK_URL not set; shift reports are only logged");
        Arc::new(LogExporter)
    }
}

fn build_speech(config: &AppConfig) -> Arc<dyn SpeechAnalyzer> {
    if !config.speech_analysis_enabled {
        info!("speech analysis disabled by SPEECH_ANALYSIS_ENABLED");
        return Arc::new(DisabledSpeechAnalyzer);
    }
    if let Some(api_key) = config.openai_api_key.clone() {
        Arc::new(OpenAiSpeechAnalyzer::new(
            api_key,
            config.openai_stt_model.clone(),
        ))
    } else {
        warn!("OPENAI_API_KEY not set; speech analysis is disabled");
        Arc::new(DisabledSpeechAnalyzer)
    }
}
