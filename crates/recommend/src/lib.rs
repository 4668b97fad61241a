//! Feedback-driven ranking.
//!
//! A [`PreferenceModel`] summarizes explicit likes and dislikes as two
//! centroid embeddings; the [`Recommender`] scores every candidate item
//! against it, with explicit feedback always taking precedence.

pub mod preference_model;
pub mod recommender;

pub use preference_model::{PreferenceModel, NEUTRAL_SCORE};
pub use recommender::{Recommender, RefreshStatus};
