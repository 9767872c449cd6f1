//! Local implementations of the `pagegist` retrieve-and-summarize pipeline.
//!
//! - [`render_playwright`]: headless Chromium in a child process, under a hard deadline.
//! - [`extract`]: HTML to normalized plain text.
//! - [`truncate`]: `cl100k_base` token counting and prefix truncation.
//! - [`openai_compat`] / [`summarize`]: chat-completion client and the bounded-retry
//!   summarizer on top of it.
//! - [`controller`]: the shrink-and-retry policy.
//! - [`visit`]: the assembled pipeline, the `visit` capability and the capability registry.

pub mod config;
pub mod controller;
pub mod extract;
pub mod openai_compat;
pub mod prompt;
pub mod render_playwright;
pub mod summarize;
pub mod truncate;
pub mod visit;

pub use config::VisitConfig;
pub use visit::{CapabilityRegistry, Visit, VisitCapability};
