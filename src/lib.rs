//! Study-material assistant.
//!
//! Upload a PDF or a video, get a digest of it, ask questions about it and
//! quiz yourself on it. Text comes from PDF extraction or audio
//! transcription; everything else is an LLM completion call.

pub mod ai_client;
pub mod app_state;
pub mod digest;
pub mod http_server;
pub mod material;
pub mod pipeline;
pub mod qa;
pub mod quiz;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod testing;
