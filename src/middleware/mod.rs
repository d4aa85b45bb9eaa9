pub mod auth;

// Re-export middleware functions
pub use auth::poller_auth_middleware;
