//! Scripted capability doubles shared by unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::ai_client::{CompletionClient, CompletionRequest, LlmError, TranscriptionRequest, Transcriber};
use crate::material::pdf_extractor::PdfReader;
use crate::material::video::AudioExtractor;
use crate::material::ExtractError;

fn api_failure(body: &str) -> LlmError {
    LlmError::Api { status: 503, body: body.to_string() }
}

/// Completion client that replays scripted replies and records every request
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self::new(VecDeque::new(), Ok(reply.to_string()))
    }

    pub fn failing(body: &str) -> Self {
        Self::new(VecDeque::new(), Err(body.to_string()))
    }

    /// Replies in order; once exhausted every call fails
    pub fn script(replies: Vec<Result<&str, &str>>) -> Self {
        let script = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self::new(script, Err("script exhausted".to_string()))
    }

    fn new(script: VecDeque<Result<String, String>>, fallback: Result<String, String>) -> Self {
        Self {
            script: Mutex::new(script),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(|body| api_failure(&body))
    }
}

/// Records the address of every buffer it is handed
pub struct FakePdfReader {
    pages: Result<Vec<String>, String>,
    buffers: Mutex<Vec<usize>>,
}

impl FakePdfReader {
    pub fn with_pages(pages: &[&str]) -> Self {
        Self {
            pages: Ok(pages.iter().map(|p| p.to_string()).collect()),
            buffers: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self { pages: Err(message.to_string()), buffers: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }

    pub fn buffers(&self) -> Vec<usize> {
        self.buffers.lock().unwrap().clone()
    }
}

impl PdfReader for FakePdfReader {
    fn pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        self.buffers.lock().unwrap().push(pdf_bytes.as_ptr() as usize);
        self.pages.clone().map_err(ExtractError::Pdf)
    }
}

/// Writes a few placeholder bytes instead of running ffmpeg
#[derive(Default)]
pub struct FakeAudioExtractor {
    fail: bool,
    videos: Mutex<Vec<PathBuf>>,
    contents: Mutex<Vec<Vec<u8>>>,
}

impl FakeAudioExtractor {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// What each video file held when ffmpeg would have read it
    pub fn contents(&self) -> Vec<Vec<u8>> {
        self.contents.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.videos.lock().unwrap().len()
    }

    pub fn videos(&self) -> Vec<PathBuf> {
        self.videos.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioExtractor for FakeAudioExtractor {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), ExtractError> {
        self.videos.lock().unwrap().push(video.to_path_buf());
        let content = tokio::fs::read(video).await?;
        self.contents.lock().unwrap().push(content);
        if self.fail {
            return Err(ExtractError::Audio("no audio stream".to_string()));
        }
        tokio::fs::write(output, b"ID3").await?;
        Ok(())
    }
}

pub struct FakeTranscriber {
    reply: Option<String>,
    seen: Mutex<Vec<(PathBuf, TranscriptionRequest)>>,
}

impl FakeTranscriber {
    pub fn replying(text: &str) -> Self {
        Self { reply: Some(text.to_string()), seen: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { reply: None, seen: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<(PathBuf, TranscriptionRequest)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: &Path, request: &TranscriptionRequest) -> Result<String, LlmError> {
        assert!(audio.exists(), "audio must exist while transcribing");
        self.seen.lock().unwrap().push((audio.to_path_buf(), request.clone()));
        self.reply.clone().ok_or_else(|| api_failure("transcription backend down"))
    }
}
