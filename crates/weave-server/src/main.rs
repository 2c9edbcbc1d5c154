use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use weave_agent::LlmAgent;
use weave_core::{AgentConfig, SharedMemoryStore, SqliteBackend, StorageBackend};
use weave_llm::{LLMProvider, OpenAIProvider, ScriptedProvider};
use weave_server::apps::InMemoryAppProvider;
use weave_server::lifecycle::CreateAgentRequest;
use weave_server::logging::init_logging;
use weave_server::server::run_server;
use weave_server::state::{ServerConfig, ServerState};
use weave_trace::{spawn_eviction_worker, TraceStore, Tracer};

#[derive(Parser, Debug, Clone)]
#[command(name = "weave-server")]
#[command(about = "Multi-agent LLM orchestration server")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8081")]
    port: u16,

    /// LLM provider (openai or scripted)
    #[arg(long, env = "LLM_PROVIDER", default_value = "openai")]
    provider: ProviderType,

    /// LLM API base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    llm_base_url: String,

    /// LLM model name
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// LLM API key
    #[arg(long, env = "LLM_API_KEY", default_value = "sk-test")]
    api_key: String,

    /// Default agent config file (YAML or JSON)
    #[arg(long, env = "AGENT_CONFIG")]
    agent_config: Option<PathBuf>,

    /// Pattern directory loaded into the default agent at startup
    #[arg(long, env = "PATTERNS_DIR")]
    patterns_dir: Option<PathBuf>,

    /// Admin token; empty disables the admin check
    #[arg(long, env = "ADMIN_TOKEN", default_value = "")]
    admin_token: String,

    /// Reject requests without an x-user-id header
    #[arg(long, env = "REQUIRE_USER_ID", default_value = "false")]
    require_user_id: bool,

    /// Sqlite file for the storage backend; omit for in-memory only
    #[arg(long, env = "STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    /// Trace retention in minutes
    #[arg(long, env = "TRACE_TTL_MINUTES", default_value = "60")]
    trace_ttl_minutes: i64,

    /// Log level (overrides debug flag)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ProviderType {
    #[value(name = "openai")]
    OpenAI,
    Scripted,
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    if cli.log_level.is_some() {
        env_logger::init();
    } else {
        init_logging(cli.debug);
    }

    log::info!("Starting weave-server on port {}", cli.port);
    log::info!("LLM Configuration:");
    log::info!("  Provider: {:?}", cli.provider);
    log::info!("  Base URL: {}", cli.llm_base_url);
    log::info!("  Model: {}", cli.model);

    let provider: Arc<dyn LLMProvider> = match cli.provider {
        ProviderType::OpenAI => Arc::new(
            OpenAIProvider::new(cli.api_key.clone())
                .with_base_url(cli.llm_base_url.clone())
                .with_model(cli.model.clone()),
        ),
        ProviderType::Scripted => Arc::new(ScriptedProvider::new()),
    };

    let state = Arc::new(ServerState::new(
        provider.clone(),
        ServerConfig {
            admin_token: cli.admin_token.clone(),
            require_user_id: cli.require_user_id,
            ..ServerConfig::default()
        },
    ));

    state
        .set_shared_memory(Arc::new(SharedMemoryStore::new()))
        .await;
    state
        .set_app_provider(Arc::new(InMemoryAppProvider::new()))
        .await;
    state.judges().set_default_provider(provider.clone()).await;

    if let Some(path) = cli.storage_path.as_ref() {
        match SqliteBackend::open(path) {
            Ok(backend) => {
                let backend = Arc::new(backend);
                if let Err(e) = backend.migrate().await {
                    log::error!("storage migration failed: {}", e);
                } else {
                    state.set_storage_backend(backend).await;
                    log::info!("Storage backend ready at {}", path.display());
                }
            }
            Err(e) => log::error!("failed to open storage at {}: {}", path.display(), e),
        }
    }

    // Trace capture with TTL eviction.
    let trace_store = state
        .trace_store()
        .await
        .unwrap_or_else(|| Arc::new(TraceStore::new()));
    state
        .set_tracer(Arc::new(Tracer::new(trace_store.clone())))
        .await;
    let _eviction = spawn_eviction_worker(
        trace_store,
        chrono::Duration::minutes(cli.trace_ttl_minutes.max(1)),
        std::time::Duration::from_secs(60),
    );

    // Default agent: from the config file when given, otherwise a plain
    // assistant so the server answers out of the box.
    let default_info = match cli.agent_config.as_ref() {
        Some(path) => {
            state
                .create_agent_from_config(CreateAgentRequest {
                    config: None,
                    config_path: Some(path.display().to_string()),
                })
                .await
        }
        None => {
            let mut config = AgentConfig::new("assistant");
            config.description = "Default conversational agent".to_string();
            config.system_prompt = "You are a helpful assistant.".to_string();
            let agent = Arc::new(LlmAgent::from_config(&config, provider.clone()));
            let agent_id = uuid::Uuid::new_v4().to_string();
            if let Err(e) = state.add_agent(agent_id.clone(), agent).await {
                log::error!("default agent registration failed: {}", e);
            }
            state.get_agent(&agent_id).await
        }
    };

    match default_info {
        Ok(info) => {
            if let Err(e) = state.set_default_agent(&info.id).await {
                log::error!("failed to set default agent: {}", e);
            }
            log::info!("Default agent '{}' ready ({})", info.name, info.id);

            if let Some(dir) = cli.patterns_dir.as_ref() {
                match state
                    .load_patterns(weave_server::patterns::LoadPatternsRequest {
                        source: dir.display().to_string(),
                        agent_id: Some(info.id.clone()),
                        watch: true,
                    })
                    .await
                {
                    Ok(loaded) => log::info!(
                        "Loaded {} pattern sets",
                        loaded.loaded.values().sum::<usize>()
                    ),
                    Err(e) => log::warn!("pattern load failed: {}", e),
                }
            }
        }
        Err(e) => log::error!("default agent setup failed: {}", e),
    }

    run_server(state, cli.port).await
}
