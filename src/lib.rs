//! Client-side gateway for hosted generative media models
//!
//! Generates and edits still images, generates and animates videos, and
//! analyzes video frames. Long-running video jobs are polled to completion
//! with an estimated progress percentage, and finished media is handed back
//! as `data:` or registry-backed `blob:` URLs.

pub mod ai;
pub mod blob;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod media;
pub mod models;
pub mod poller;

pub use error::{Error, Result};
pub use gateway::GenerationGateway;
