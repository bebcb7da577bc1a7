//! Layered canvas view of an agent's research steps.
//!
//! The engine half ([`layout`], [`cache`], [`offload`], [`pipeline`]) turns a
//! [`types::GraphSnapshot`] into positioned nodes and routed edges. The view
//! half ([`state`], [`render`]) maps pointer and keyboard input onto a
//! pan/zoom viewport and paints it onto a 2D canvas.

mod component;
pub mod cache;
pub mod config;
pub mod error;
pub mod layout;
pub mod offload;
pub mod pipeline;
pub mod protocol;
pub mod render;
pub mod source;
pub mod state;
pub mod style;
pub mod types;
pub mod web;

pub use component::ResearchGraphCanvas;
pub use config::GraphConfig;
pub use source::{GraphSource, MemoryGraphSource};
