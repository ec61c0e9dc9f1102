pub mod bootstrap;
pub mod config;
pub mod content;
pub mod error;
pub mod idmap;
pub mod io;
pub mod latency;
pub mod latent;
pub mod logging;
pub mod membership;
pub mod metrics;
pub mod pipeline;
pub mod rank;
pub mod stats;
pub mod userknn;
