pub mod bridge;
pub mod chat;
pub mod llm;
pub mod onprem;
pub mod realtime;
pub mod telephony;
pub mod tools;

// Re-export commonly used types for convenience
pub use bridge::{
    BridgeError, BridgeExit, BridgeSettings, CallSession, Leg, LegKind, SessionBridge,
    SessionRegistry, SessionState,
};
pub use chat::{ChatAgent, ChatReply};
pub use llm::{LanguageModel, LlmProvider, LlmService};
pub use onprem::{OnPremBridge, OnPremConfig, OnPremError, PendingRequest};
pub use realtime::{RealtimeConnector, RealtimeSettings};
pub use tools::{ToolError, ToolHandler, ToolInvocation, ToolResult, ToolRouter};
