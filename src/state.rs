use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::bridge::{SessionBridge, SessionRegistry};
use crate::core::chat::ChatAgent;
use crate::core::llm::{AnthropicChat, LlmError, LlmService};
use crate::core::onprem::OnPremBridge;
use crate::core::realtime::RealtimeConnector;
use crate::core::tools::{
    AssistantHandler, DeviceHandler, DocumentationHandler, HttpDocumentSearch, ServiceNowClient,
    TicketingBackend, TicketingHandler, ToolError, ToolRouter, ToolRouterError,
};

/// Timeout for documentation search requests.
const DOCUMENTATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Router(#[from] ToolRouterError),
    #[error("Failed to build tool backend: {0}")]
    Backend(#[from] ToolError),
    #[error("Failed to build LLM client: {0}")]
    Llm(#[from] LlmError),
}

/// Shared by every handler and call session.
pub struct AppState {
    pub config: ServerConfig,
    pub onprem: Arc<OnPremBridge>,
    pub tools: Arc<ToolRouter>,
    pub bridge: SessionBridge,
    /// `None` when no realtime API key is configured; calls are refused.
    pub connector: Option<RealtimeConnector>,
    /// `None` without `ANTHROPIC_API_KEY`; the chat route answers 503.
    pub chat: Option<ChatAgent>,
    pub sessions: SessionRegistry,
    shutdown: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    /// Build the tool backends from `config` and start the orphan reaper.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let onprem = Arc::new(OnPremBridge::new(config.onprem.bridge_config()));
        let tools = Arc::new(build_tool_router(&config, &onprem)?);
        let state = Self::from_parts(config, onprem, tools);
        state.start_reaper();
        Ok(state)
    }

    /// Assemble state from prebuilt parts. The reaper is not started.
    pub fn from_parts(
        config: ServerConfig,
        onprem: Arc<OnPremBridge>,
        tools: Arc<ToolRouter>,
    ) -> Arc<Self> {
        let connector = match config.openai_api_key.clone() {
            Some(key) => Some(RealtimeConnector::new(config.realtime.clone(), key)),
            None => {
                warn!("OPENAI_API_KEY not configured, incoming calls cannot be bridged");
                None
            }
        };
        let bridge = SessionBridge::new(Arc::clone(&tools), config.bridge.clone());
        let chat = match config.chat_config().map(AnthropicChat::from_config) {
            Some(Ok(llm)) => Some(ChatAgent::new(llm, Arc::clone(&tools))),
            Some(Err(e)) => {
                warn!(error = %e, "Chat channel disabled");
                None
            }
            None => {
                info!("ANTHROPIC_API_KEY not configured, chat channel disabled");
                None
            }
        };

        Arc::new(Self {
            config,
            onprem,
            tools,
            bridge,
            connector,
            chat,
            sessions: SessionRegistry::new(),
            shutdown: CancellationToken::new(),
            reaper: Mutex::new(None),
        })
    }

    /// Spawn the on-prem orphan reaper if it is not running.
    pub fn start_reaper(&self) {
        let mut reaper = self.reaper.lock();
        if reaper.is_none() {
            *reaper = Some(
                self.onprem
                    .spawn_reaper(self.config.onprem.reap_interval(), self.shutdown.child_token()),
            );
        }
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Hang up every call and stop background tasks.
    pub fn shutdown(&self) {
        let calls = self.sessions.hang_up_all();
        info!(calls, "Shutting down, hanging up active calls");
        self.shutdown.cancel();
        self.reaper.lock().take();
    }
}

/// Register a handler for each configured backend.
///
/// Device tools are always present since they only need the on-prem queue.
/// Ticketing, documentation and assistant tools are added when their
/// backend is configured.
pub fn build_tool_router(
    config: &ServerConfig,
    onprem: &Arc<OnPremBridge>,
) -> Result<ToolRouter, StateError> {
    let mut builder =
        ToolRouter::builder().with_handler(Arc::new(DeviceHandler::new(Arc::clone(onprem))));

    let tickets: Option<Arc<dyn TicketingBackend>> = match &config.servicenow {
        Some(sn) => {
            let client: Arc<dyn TicketingBackend> = Arc::new(ServiceNowClient::new(sn.clone())?);
            builder = builder.with_handler(Arc::new(TicketingHandler::new(Arc::clone(&client))));
            Some(client)
        }
        None => {
            info!("ServiceNow not configured, ticketing tools disabled");
            None
        }
    };

    match &config.documentation.search_url {
        Some(url) => {
            let search = HttpDocumentSearch::new(url.clone(), DOCUMENTATION_TIMEOUT)?;
            builder = builder.with_handler(Arc::new(DocumentationHandler::new(
                Arc::new(search),
                config.documentation.top_k,
            )));
        }
        None => info!("Documentation search not configured, documentation tools disabled"),
    }

    match config.llm_config() {
        Some(llm_config) => {
            let provider = llm_config.provider;
            let llm = LlmService::from_config(llm_config)?;
            builder = builder.with_handler(Arc::new(AssistantHandler::new(Arc::new(llm), tickets)));
            info!(%provider, "Assistant tools enabled");
        }
        None => info!(
            provider = %config.llm.provider,
            "No API key for assistant LLM, assistant tools disabled"
        ),
    }

    let router = builder.build()?;
    info!(tools = router.len(), "Tool router ready");
    Ok(router)
}
