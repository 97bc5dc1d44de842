// ─── Pause engine ───
pub mod countdown;
pub mod orchestrator;
pub mod pause;
pub mod presentation;
pub mod scheduler;

// ─── Actors ───
pub mod feed;
pub mod match_clock;
pub mod session;

// ─── Shared types, messages, config ───
pub mod config;
pub mod messages;
pub mod types;
