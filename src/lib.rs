//! Bulk Courier: rate-limited, personalized bulk message delivery through a
//! UI-automation channel.

pub mod channels;
pub mod config;
pub mod dataset;
pub mod delivery;
pub mod error;
pub mod scheduler;
pub mod stats;
pub mod templates;
