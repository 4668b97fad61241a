//! Chat model backends for feedloom.
//!
//! All backends implement `feedloom_core::Provider`. The router maps a
//! model type name from configuration to a backend and model id.

pub mod embedder;
pub mod openai_compat;
pub mod polling;
pub mod router;

pub use embedder::ProviderEmbedder;
pub use openai_compat::OpenAiCompatProvider;
pub use polling::PollingProvider;
pub use router::{ProviderRouter, ResolvedModel, build_from_config};
