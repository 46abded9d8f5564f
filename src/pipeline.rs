//! Material analysis pipeline: extract, then digest.
//!
//! `Analyzer::analyze` runs the pipeline on a spawned task and hands back a
//! finite stream of `AnalysisEvent`s: zero or more progress events followed
//! by exactly one event with `done == true`.

use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::digest::Digester;
use crate::material::{Extractor, ProgressSink, UploadedFile, STATUS_NO_FILE};

pub const STATUS_DIGESTING: &str = "Starting analysis with the language model...";

/// What a finished run leaves behind for the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    /// Extracted material text, when any was produced
    pub material: Option<String>,
    /// Digest text, when the model produced one
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisEvent {
    pub digest: String,
    pub status: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub result: Option<AnalysisResult>,
}

impl AnalysisEvent {
    fn progress(status: impl Into<String>) -> Self {
        Self { digest: String::new(), status: status.into(), done: false, error: None, result: None }
    }

    fn finished(digest: impl Into<String>, status: impl Into<String>, result: AnalysisResult) -> Self {
        Self { digest: digest.into(), status: status.into(), done: true, error: None, result: Some(result) }
    }

    fn failed(error: impl std::fmt::Display, result: AnalysisResult) -> Self {
        let error = error.to_string();
        Self {
            digest: String::new(),
            status: format!("Error: {}", error),
            done: true,
            error: Some(error),
            result: Some(result),
        }
    }
}

pub struct Analyzer {
    extractor: Extractor,
    digester: Digester,
}

impl Analyzer {
    pub fn new(extractor: Extractor, digester: Digester) -> Self {
        Self { extractor, digester }
    }

    pub fn analyze(self: &Arc<Self>, upload: Option<UploadedFile>) -> impl Stream<Item = AnalysisEvent> + Send + 'static {
        let (tx, rx) = mpsc::channel(16);
        let analyzer = Arc::clone(self);
        tokio::spawn(async move {
            let last = analyzer.run(upload, &tx).await;
            // the receiver may already be gone; nothing left to do then
            let _ = tx.send(last).await;
        });

        futures::stream::unfold(rx, |mut rx| async move {
            let event = rx.recv().await?;
            Some((event, rx))
        })
    }

    /// Run the pipeline, forwarding progress to `tx`; returns the terminal event
    async fn run(&self, upload: Option<UploadedFile>, tx: &mpsc::Sender<AnalysisEvent>) -> AnalysisEvent {
        let Some(upload) = upload else {
            return AnalysisEvent::finished("", STATUS_NO_FILE, AnalysisResult::default());
        };

        tracing::info!(file = %upload.name, bytes = upload.bytes.len(), "analysis started");

        let (sink, mut statuses) = ProgressSink::channel();
        let forward_tx = tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(status) = statuses.recv().await {
                if forward_tx.send(AnalysisEvent::progress(status)).await.is_err() {
                    break;
                }
            }
        });

        let extracted = self.extractor.extract(Some(&upload), &sink).await;
        // closing the sink lets the forwarder drain and finish before the terminal event
        drop(sink);
        let _ = forwarder.await;

        let text = match extracted {
            Ok(text) => text.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::error!(file = %upload.name, "extraction failed: {}", e);
                return AnalysisEvent::failed(e, AnalysisResult::default());
            }
        };

        if text.is_some() {
            let _ = tx.send(AnalysisEvent::progress(STATUS_DIGESTING)).await;
        }

        match self.digester.digest(text.as_deref()).await {
            Ok(outcome) => {
                let result = AnalysisResult {
                    digest: outcome.is_ready().then(|| outcome.message().to_string()),
                    material: text,
                };
                AnalysisEvent::finished(outcome.message(), outcome.status(), result)
            }
            Err(e) => {
                tracing::error!(file = %upload.name, "digest failed: {}", e);
                AnalysisEvent::failed(e, AnalysisResult { material: text, digest: None })
            }
        }
    }
}
