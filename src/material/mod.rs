//! Material upload handling and text extraction
//!
//! An upload is dispatched on its file extension:
//! - PDF: page texts concatenated in order
//! - Video: audio track extracted to a temporary file, then transcribed
//! - Anything else: no text
//!
//! Phase transitions are reported as status strings through a `ProgressSink`.

pub mod pdf_extractor;
pub mod video;

use bytes::Bytes;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::ai_client::{LlmError, TranscriptionRequest, Transcriber};
use crate::utils::file_extension;
use pdf_extractor::{join_pages, PdfReader};
use video::{temp_audio_path, AudioExtractor};

pub const STATUS_NO_FILE: &str = "No file selected.";
pub const STATUS_STARTED: &str = "Starting file processing...";
pub const STATUS_READING_PDF: &str = "Reading PDF file...";
pub const STATUS_PDF_DONE: &str = "Finished reading PDF file.";
pub const STATUS_PROCESSING_VIDEO: &str = "Processing video file...";
pub const STATUS_AUDIO_DONE: &str = "Audio extracted. Starting transcription...";
pub const STATUS_TRANSCRIPTION_DONE: &str = "Transcription finished.";

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read PDF: {0}")]
    Pdf(String),
    #[error("audio extraction failed: {0}")]
    Audio(String),
    #[error("transcription failed: {0}")]
    Transcription(#[from] LlmError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Pdf,
    Video,
    Unsupported,
}

/// A file handed over by the browser; transient, never persisted
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    /// Shared buffer; clones are reference-counted, not copied
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }

    pub fn kind(&self) -> MaterialKind {
        match file_extension(&self.name).as_deref() {
            Some("pdf") => MaterialKind::Pdf,
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => MaterialKind::Video,
            _ => MaterialKind::Unsupported,
        }
    }
}

/// Receives human-readable status lines as extraction progresses
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, status: impl Into<String>) {
        let status = status.into();
        tracing::info!("{}", status);
        // a caller that stopped listening does not stop the work
        let _ = self.tx.send(status);
    }
}

/// Content extractor: upload in, plain text out
pub struct Extractor {
    pdf: Arc<dyn PdfReader>,
    audio: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    transcription: TranscriptionRequest,
}

impl Extractor {
    pub fn new(
        pdf: Arc<dyn PdfReader>,
        audio: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        transcription: TranscriptionRequest,
    ) -> Self {
        Self { pdf, audio, transcriber, transcription }
    }

    /// Extract the material text of `upload`.
    ///
    /// `Ok(None)` means nothing could be extracted (no file, or an
    /// unsupported type); no external capability is invoked in that case.
    pub async fn extract(
        &self,
        upload: Option<&UploadedFile>,
        progress: &ProgressSink,
    ) -> Result<Option<String>, ExtractError> {
        let Some(upload) = upload else {
            progress.report(STATUS_NO_FILE);
            return Ok(None);
        };

        progress.report(STATUS_STARTED);

        match upload.kind() {
            MaterialKind::Pdf => {
                progress.report(STATUS_READING_PDF);
                let text = self.extract_pdf(upload).await?;
                progress.report(STATUS_PDF_DONE);
                Ok(Some(text))
            }
            MaterialKind::Video => {
                progress.report(STATUS_PROCESSING_VIDEO);
                let text = self.transcribe_video(upload, progress).await?;
                progress.report(STATUS_TRANSCRIPTION_DONE);
                Ok(Some(text))
            }
            MaterialKind::Unsupported => {
                tracing::info!(file = %upload.name, "unsupported file type, no text extracted");
                Ok(None)
            }
        }
    }

    async fn extract_pdf(&self, upload: &UploadedFile) -> Result<String, ExtractError> {
        let reader = self.pdf.clone();
        let bytes = upload.bytes.clone();
        let pages = tokio::task::spawn_blocking(move || reader.pages(&bytes))
            .await
            .map_err(|e| ExtractError::Pdf(format!("PDF parser aborted: {}", e)))??;

        tracing::info!(file = %upload.name, pages = pages.len(), "PDF pages extracted");
        Ok(join_pages(pages))
    }

    async fn transcribe_video(
        &self,
        upload: &UploadedFile,
        progress: &ProgressSink,
    ) -> Result<String, ExtractError> {
        let video = write_temp_video(upload).await?;

        let audio = temp_audio_path()?;
        self.audio.extract_audio(video.path(), &audio).await?;
        drop(video);
        progress.report(STATUS_AUDIO_DONE);

        let transcript = self.transcriber.transcribe(&audio, &self.transcription).await;
        // removed on every path; close() just surfaces the error on the success path
        if let Err(e) = audio.close() {
            tracing::warn!("failed to remove temporary audio file: {}", e);
        }
        let text = transcript?;

        tracing::info!(file = %upload.name, chars = text.chars().count(), "transcript received");
        Ok(text)
    }
}

/// Copy the upload to a temp file for ffmpeg, keeping its extension.
/// The write happens on the blocking pool.
async fn write_temp_video(upload: &UploadedFile) -> Result<NamedTempFile, ExtractError> {
    let suffix = file_extension(&upload.name)
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    let bytes = upload.bytes.clone();

    tokio::task::spawn_blocking(move || -> Result<NamedTempFile, ExtractError> {
        let mut video = tempfile::Builder::new()
            .prefix("smart-edu-upload-")
            .suffix(&suffix)
            .tempfile()?;
        video.write_all(&bytes)?;
        video.flush()?;
        Ok(video)
    })
    .await
    .map_err(|e| ExtractError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAudioExtractor, FakePdfReader, FakeTranscriber};

    fn extractor(
        pdf: Arc<FakePdfReader>,
        audio: Arc<FakeAudioExtractor>,
        transcriber: Arc<FakeTranscriber>,
    ) -> Extractor {
        Extractor::new(
            pdf,
            audio,
            transcriber,
            TranscriptionRequest {
                model: "gpt-4o-mini-transcribe".to_string(),
                prompt: Some("hint".to_string()),
                language: "ja".to_string(),
            },
        )
    }

    fn drain(mut rx: mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(status) = rx.try_recv() {
            out.push(status);
        }
        out
    }

    #[test]
    fn test_kind_dispatch() {
        assert_eq!(UploadedFile::new("a.pdf", Vec::<u8>::new()).kind(), MaterialKind::Pdf);
        assert_eq!(UploadedFile::new("A.PDF", Vec::<u8>::new()).kind(), MaterialKind::Pdf);
        assert_eq!(UploadedFile::new("lecture.mp4", Vec::<u8>::new()).kind(), MaterialKind::Video);
        assert_eq!(UploadedFile::new("lecture.webm", Vec::<u8>::new()).kind(), MaterialKind::Video);
        assert_eq!(UploadedFile::new("notes.docx", Vec::<u8>::new()).kind(), MaterialKind::Unsupported);
        assert_eq!(UploadedFile::new("pdf", Vec::<u8>::new()).kind(), MaterialKind::Unsupported);
    }

    #[tokio::test]
    async fn test_missing_file_touches_nothing() {
        let (pdf, audio, transcriber) = (
            Arc::new(FakePdfReader::with_pages(&["x"])),
            Arc::new(FakeAudioExtractor::default()),
            Arc::new(FakeTranscriber::replying("t")),
        );
        let ex = extractor(pdf.clone(), audio.clone(), transcriber.clone());
        let (sink, rx) = ProgressSink::channel();

        let text = ex.extract(None, &sink).await.unwrap();

        assert_eq!(text, None);
        assert_eq!(drain(rx), vec![STATUS_NO_FILE.to_string()]);
        assert_eq!(pdf.calls(), 0);
        assert_eq!(audio.calls(), 0);
        assert_eq!(transcriber.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_file_touches_nothing() {
        let (pdf, audio, transcriber) = (
            Arc::new(FakePdfReader::with_pages(&["x"])),
            Arc::new(FakeAudioExtractor::default()),
            Arc::new(FakeTranscriber::replying("t")),
        );
        let ex = extractor(pdf.clone(), audio.clone(), transcriber.clone());
        let (sink, rx) = ProgressSink::channel();
        let upload = UploadedFile::new("slides.pptx", b"bytes".to_vec());

        let text = ex.extract(Some(&upload), &sink).await.unwrap();

        assert_eq!(text, None);
        assert_eq!(drain(rx), vec![STATUS_STARTED.to_string()]);
        assert_eq!(pdf.calls() + audio.calls() + transcriber.calls(), 0);
    }

    #[tokio::test]
    async fn test_pdf_pages_concatenated_in_order() {
        let pdf = Arc::new(FakePdfReader::with_pages(&["First page. ", "Second page.", "", "Third"]));
        let ex = extractor(
            pdf.clone(),
            Arc::new(FakeAudioExtractor::default()),
            Arc::new(FakeTranscriber::replying("unused")),
        );
        let (sink, rx) = ProgressSink::channel();
        let upload = UploadedFile::new("notes.pdf", b"%PDF-1.7".to_vec());

        let text = ex.extract(Some(&upload), &sink).await.unwrap();

        assert_eq!(text.as_deref(), Some("First page. Second page.Third"));
        assert_eq!(pdf.calls(), 1);
        assert_eq!(
            drain(rx),
            vec![
                STATUS_STARTED.to_string(),
                STATUS_READING_PDF.to_string(),
                STATUS_PDF_DONE.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_pdf_without_text_yields_empty_string() {
        let ex = extractor(
            Arc::new(FakePdfReader::with_pages(&["", ""])),
            Arc::new(FakeAudioExtractor::default()),
            Arc::new(FakeTranscriber::replying("unused")),
        );
        let (sink, _rx) = ProgressSink::channel();
        let upload = UploadedFile::new("scan.pdf", vec![1u8, 2, 3]);

        assert_eq!(ex.extract(Some(&upload), &sink).await.unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_pdf_error_propagates() {
        let ex = extractor(
            Arc::new(FakePdfReader::failing("encrypted")),
            Arc::new(FakeAudioExtractor::default()),
            Arc::new(FakeTranscriber::replying("unused")),
        );
        let (sink, _rx) = ProgressSink::channel();
        let upload = UploadedFile::new("locked.pdf", Vec::<u8>::new());

        let err = ex.extract(Some(&upload), &sink).await.unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(msg) if msg.contains("encrypted")));
    }

    #[tokio::test]
    async fn test_video_transcribed_and_audio_removed() {
        let audio = Arc::new(FakeAudioExtractor::default());
        let transcriber = Arc::new(FakeTranscriber::replying("spoken lecture text"));
        let ex = extractor(Arc::new(FakePdfReader::with_pages(&[])), audio.clone(), transcriber.clone());
        let (sink, rx) = ProgressSink::channel();
        let upload = UploadedFile::new("lecture.mp4", b"fake video".to_vec());

        let text = ex.extract(Some(&upload), &sink).await.unwrap();

        assert_eq!(text.as_deref(), Some("spoken lecture text"));
        assert_eq!(
            drain(rx),
            vec![
                STATUS_STARTED.to_string(),
                STATUS_PROCESSING_VIDEO.to_string(),
                STATUS_AUDIO_DONE.to_string(),
                STATUS_TRANSCRIPTION_DONE.to_string(),
            ]
        );

        let seen = transcriber.seen();
        assert_eq!(seen.len(), 1);
        let (path, request) = &seen[0];
        assert_eq!(request.language, "ja");
        assert_eq!(request.prompt.as_deref(), Some("hint"));
        assert!(!path.exists(), "temporary audio file must be deleted");

        let videos = audio.videos();
        assert_eq!(videos.len(), 1);
        assert!(!videos[0].exists(), "temporary video copy must be deleted");
        assert_eq!(audio.contents(), vec![b"fake video".to_vec()]);
    }

    #[tokio::test]
    async fn test_pdf_reader_sees_the_upload_buffer() {
        let pdf = Arc::new(FakePdfReader::with_pages(&["text"]));
        let ex = extractor(
            pdf.clone(),
            Arc::new(FakeAudioExtractor::default()),
            Arc::new(FakeTranscriber::replying("unused")),
        );
        let (sink, _rx) = ProgressSink::channel();
        let upload = UploadedFile::new("big.pdf", vec![7u8; 4096]);

        ex.extract(Some(&upload), &sink).await.unwrap();

        // same allocation, handed over without a copy
        assert_eq!(pdf.buffers(), vec![upload.bytes.as_ptr() as usize]);
    }

    #[tokio::test]
    async fn test_write_temp_video_keeps_extension_and_content() {
        let upload = UploadedFile::new("Lecture.MKV", vec![3u8; 1024]);

        let video = write_temp_video(&upload).await.unwrap();

        assert_eq!(video.path().extension().and_then(|e| e.to_str()), Some("mkv"));
        assert_eq!(std::fs::read(video.path()).unwrap(), vec![3u8; 1024]);
        let path = video.path().to_path_buf();
        drop(video);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_audio_removed_when_transcription_fails() {
        let transcriber = Arc::new(FakeTranscriber::failing());
        let ex = extractor(
            Arc::new(FakePdfReader::with_pages(&[])),
            Arc::new(FakeAudioExtractor::default()),
            transcriber.clone(),
        );
        let (sink, _rx) = ProgressSink::channel();
        let upload = UploadedFile::new("lecture.mp4", b"fake video".to_vec());

        let err = ex.extract(Some(&upload), &sink).await.unwrap_err();

        assert!(matches!(err, ExtractError::Transcription(_)));
        let (path, _) = &transcriber.seen()[0];
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_audio_extraction_failure_skips_transcription() {
        let transcriber = Arc::new(FakeTranscriber::replying("unused"));
        let ex = extractor(
            Arc::new(FakePdfReader::with_pages(&[])),
            Arc::new(FakeAudioExtractor::failing()),
            transcriber.clone(),
        );
        let (sink, _rx) = ProgressSink::channel();
        let upload = UploadedFile::new("broken.mp4", vec![0u8; 16]);

        let err = ex.extract(Some(&upload), &sink).await.unwrap_err();

        assert!(matches!(err, ExtractError::Audio(_)));
        assert_eq!(transcriber.calls(), 0);
    }
}
