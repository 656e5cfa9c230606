//! Extraction pipeline: normalize, recognize, prompt, complete, parse.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::error::{ErrorKind, OcrError, Result};
use crate::invoice::{PromptBuilder, ResponseParser};
use crate::llm::{CompletionClient, OllamaClient};
use crate::models::config::TallyConfig;
use crate::models::record::{InvoiceRecord, RawDocument};
use crate::ocr::{create_backend, ImageNormalizer, OcrBackend, OcrEngine, OcrText};
use crate::staging::StagingArea;

/// Progress of one request through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Received,
    Normalized,
    Recognized,
    Prompted,
    Completed,
    Parsed,
    Done,
    Failed(ErrorKind),
}

impl PipelineState {
    /// The state that follows on success, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Normalized),
            Self::Normalized => Some(Self::Recognized),
            Self::Recognized => Some(Self::Prompted),
            Self::Prompted => Some(Self::Completed),
            Self::Completed => Some(Self::Parsed),
            Self::Parsed => Some(Self::Done),
            Self::Done | Self::Failed(_) => None,
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Identifier of the request, also used to name its staging area.
    pub request_id: Uuid,
    /// Extracted invoice record.
    pub record: InvoiceRecord,
    /// Text the OCR stage produced.
    pub ocr_text: OcrText,
    /// Whether the image went through the normalizer.
    pub normalized: bool,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Orchestrates the extraction stages for one document at a time.
///
/// Holds only read-only collaborators, so a single pipeline can serve
/// concurrent requests; each request gets its own staging area.
pub struct Pipeline<B: OcrBackend, C: CompletionClient> {
    normalizer: ImageNormalizer,
    ocr: Arc<OcrEngine<B>>,
    prompts: PromptBuilder,
    client: C,
    parser: ResponseParser,
    staging_root: PathBuf,
}

impl Pipeline<Box<dyn OcrBackend>, OllamaClient> {
    /// Build a pipeline with the backend and client selected in `config`.
    pub fn from_config(config: &TallyConfig) -> Result<Self> {
        config.validate()?;
        let backend = create_backend(&config.ocr)?;
        let client = OllamaClient::from_config(&config.model)?;
        Ok(Self::new(backend, client).with_staging_root(config.staging.root()))
    }
}

impl<B: OcrBackend + 'static, C: CompletionClient> Pipeline<B, C> {
    /// Create a pipeline over an OCR backend and a completion client.
    pub fn new(backend: B, client: C) -> Self {
        Self {
            normalizer: ImageNormalizer::new(),
            ocr: Arc::new(OcrEngine::new(backend)),
            prompts: PromptBuilder::new(),
            client,
            parser: ResponseParser::new(),
            staging_root: std::env::temp_dir(),
        }
    }

    /// Create per-request staging directories under `root`.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    /// Directory staging areas are created in.
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Access the OCR backend.
    pub fn backend(&self) -> &B {
        self.ocr.backend()
    }

    /// Access the completion client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Access the prompt builder.
    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// Run every stage for `document`.
    ///
    /// Staging, normalization and OCR run on the blocking thread pool. Staged
    /// files are removed before this returns, whatever the outcome. When the
    /// returned future is dropped early they are removed as soon as any
    /// in-flight OCR finishes.
    pub async fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        let request_id = Uuid::new_v4();
        let span = info_span!("extract", %request_id, filename = %document.filename());
        self.run(request_id, document).instrument(span).await
    }

    /// Run only normalization and OCR for `document`, on the calling thread.
    pub fn recognize(&self, document: &RawDocument) -> Result<OcrText> {
        let request_id = Uuid::new_v4();
        let _span = info_span!("recognize", %request_id, filename = %document.filename()).entered();

        let mut state = PipelineState::Received;
        self.recognition_job(request_id, document)
            .run(&mut state)
            .map(|(text, _)| text)
    }

    fn recognition_job(&self, request_id: Uuid, document: &RawDocument) -> RecognitionJob<B> {
        RecognitionJob {
            request_id,
            document: document.clone(),
            normalizer: self.normalizer,
            ocr: Arc::clone(&self.ocr),
            staging_root: self.staging_root.clone(),
        }
    }

    async fn run(&self, request_id: Uuid, document: &RawDocument) -> Result<ExtractionResult> {
        let start = Instant::now();
        let mut state = PipelineState::Received;

        let (record, ocr_text, normalized) =
            match self.run_stages(request_id, document, &mut state).await {
                Ok(parts) => parts,
                Err(e) => {
                    let failed_at = state;
                    state = PipelineState::Failed(e.kind());
                    warn!(stage = ?failed_at, state = ?state, "Extraction failed: {}", e);
                    return Err(e);
                }
            };
        advance(&mut state, PipelineState::Done);

        let processing_time_ms = start.elapsed().as_millis() as u64;
        info!("Extraction complete in {}ms", processing_time_ms);

        Ok(ExtractionResult {
            request_id,
            record,
            ocr_text,
            normalized,
            processing_time_ms,
        })
    }

    async fn run_stages(
        &self,
        request_id: Uuid,
        document: &RawDocument,
        state: &mut PipelineState,
    ) -> Result<(InvoiceRecord, OcrText, bool)> {
        let job = self.recognition_job(request_id, document);
        let span = Span::current();
        let (reached, recognized) = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let mut state = PipelineState::Received;
            let recognized = job.run(&mut state);
            (state, recognized)
        })
        .await
        .map_err(|e| OcrError::Backend(format!("OCR task did not complete: {}", e)))?;
        *state = reached;
        let (text, normalized) = recognized?;

        let prompt = self.prompts.build(&text);
        debug!("Rendered prompt {} ({} chars)", self.prompts.version(), prompt.len());
        advance(state, PipelineState::Prompted);

        let completion = self.client.complete(&prompt).await?;
        advance(state, PipelineState::Completed);

        let record = self.parser.parse(&completion)?;
        advance(state, PipelineState::Parsed);

        Ok((record, text, normalized))
    }
}

/// Blocking part of a request: staging, normalization and OCR.
///
/// Owns everything it touches so it can move to another thread. The staging
/// area lives only inside [`RecognitionJob::run`].
struct RecognitionJob<B: OcrBackend> {
    request_id: Uuid,
    document: RawDocument,
    normalizer: ImageNormalizer,
    ocr: Arc<OcrEngine<B>>,
    staging_root: PathBuf,
}

impl<B: OcrBackend> RecognitionJob<B> {
    fn run(self, state: &mut PipelineState) -> Result<(OcrText, bool)> {
        let staging = StagingArea::create(&self.staging_root, self.request_id).inspect_err(|e| {
            warn!("Failed to create staging area: {}", e);
        })?;

        let outcome = self.stages(&staging, state);
        let cleanup = staging.close();

        let recognized = outcome?;
        cleanup?;
        Ok(recognized)
    }

    fn stages(&self, staging: &StagingArea, state: &mut PipelineState) -> Result<(OcrText, bool)> {
        let (image_path, normalized) = self.prepare(staging)?;
        advance(state, PipelineState::Normalized);

        let text = self.ocr.recognize(&image_path)?;
        advance(state, PipelineState::Recognized);

        Ok((text, normalized))
    }

    /// Stage the document for OCR, normalizing it unless it is already an
    /// RGB8 PNG. Returns the path to hand to OCR and whether it was normalized.
    fn prepare(&self, staging: &StagingArea) -> Result<(PathBuf, bool)> {
        let bytes = self.document.bytes();
        let probe = self.normalizer.probe(bytes)?;
        debug!(
            "Input is {:?} {:?} {}x{}",
            probe.format, probe.color, probe.dimensions.0, probe.dimensions.1
        );

        if probe.is_canonical() {
            let path = staging.stage_png(bytes)?;
            return Ok((path, false));
        }

        let normalized = self.normalizer.normalize(bytes, &staging.source_path())?;
        Ok((normalized.path, true))
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug_assert_eq!(state.next(), Some(next), "out-of-order pipeline transition");
    debug!("{:?} -> {:?}", state, next);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, OcrError};
    use crate::mock::{MockCompletionClient, MockOcrBackend, MockReply};
    use crate::ocr::Detection;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::time::Duration;

    const SAMPLE_LINES: [&str; 5] = [
        "Invoice #123",
        "Date: 2024-01-01",
        "Sub Total: 90.00",
        "VAT: 10.00",
        "Total: 100.00",
    ];

    const SAMPLE_COMPLETION: &str = r#"
        {
            "invoiceId": "123",
            "dateOfIssue": "2024-01-01",
            "billingTo": "",
            "billingFrom": "",
            "units": [],
            "totalQuantity": "",
            "totalGrossValue": "90.00",
            "totalDiscount": "",
            "totalNetValue": "",
            "totalVatAmount": "10.00",
            "totalAmount": "100.00",
            "totalShippingCharge": ""
        }
    "#;

    fn png(image: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn rgba_document(name: &str) -> RawDocument {
        let image = RgbaImage::from_pixel(6, 6, Rgba([255, 255, 255, 255]));
        RawDocument::new(name, png(DynamicImage::ImageRgba8(image)))
    }

    fn rgb_document(name: &str, width: u32) -> RawDocument {
        let image = RgbImage::from_pixel(width, 4, Rgb([10, 20, 30]));
        RawDocument::new(name, png(DynamicImage::ImageRgb8(image)))
    }

    fn staged_entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn test_state_sequence() {
        let mut state = PipelineState::Received;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            state = next;
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                PipelineState::Received,
                PipelineState::Normalized,
                PipelineState::Recognized,
                PipelineState::Prompted,
                PipelineState::Completed,
                PipelineState::Parsed,
                PipelineState::Done,
            ]
        );
        assert!(PipelineState::Failed(ErrorKind::OcrFailure).is_terminal());
    }

    #[tokio::test]
    async fn test_labeled_invoice_scenario() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            MockOcrBackend::with_lines(SAMPLE_LINES),
            MockCompletionClient::with_response(SAMPLE_COMPLETION),
        )
        .with_staging_root(root.path());

        let result = pipeline.extract(&rgba_document("scan.png")).await.unwrap();

        let record = &result.record;
        assert_eq!(record.invoice_id, "123");
        assert_eq!(record.date_of_issue, "2024-01-01");
        assert_eq!(record.total_gross_value, "90.00");
        assert_eq!(record.total_vat_amount, "10.00");
        assert_eq!(record.total_amount, "100.00");
        assert_eq!(record.total_discount, "");
        assert!(record.units.is_empty());

        assert_eq!(result.ocr_text.as_text(), SAMPLE_LINES.join("\n"));
        let prompts = pipeline.client().prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(&SAMPLE_LINES.join("\n")));

        assert_eq!(staged_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_ocr_text_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let empty = serde_json::to_string(&InvoiceRecord::default()).unwrap();
        let pipeline = Pipeline::new(
            MockOcrBackend::with_lines(Vec::<String>::new()),
            MockCompletionClient::with_response(empty),
        )
        .with_staging_root(root.path());

        let result = pipeline.extract(&rgba_document("blank.png")).await.unwrap();
        assert!(result.ocr_text.is_empty());
        assert!(result.record.is_empty());
        assert_eq!(pipeline.client().prompts().len(), 1);
        assert_eq!(staged_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_apology_is_malformed_output() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            MockOcrBackend::with_lines(SAMPLE_LINES),
            MockCompletionClient::with_response("Sorry, I cannot process this."),
        )
        .with_staging_root(root.path());

        let err = pipeline.extract(&rgba_document("scan.png")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedModelOutput);
        assert_eq!(staged_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_stop_before_ocr() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            MockOcrBackend::with_lines(SAMPLE_LINES),
            MockCompletionClient::with_response(SAMPLE_COMPLETION),
        )
        .with_staging_root(root.path());

        let document = RawDocument::new("scan.png", b"definitely not a png".to_vec());
        let err = pipeline.extract(&document).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(pipeline.backend().seen_paths().is_empty());
        assert!(pipeline.client().prompts().is_empty());
        assert_eq!(staged_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_ocr_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            MockOcrBackend::failing("engine crashed"),
            MockCompletionClient::with_response(SAMPLE_COMPLETION),
        )
        .with_staging_root(root.path());

        let err = pipeline.extract(&rgba_document("scan.png")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OcrFailure);
        assert!(pipeline.client().prompts().is_empty());
        assert_eq!(staged_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_model_failures_keep_their_kind() {
        let cases = [
            (MockReply::Unavailable, ErrorKind::ModelUnavailable),
            (
                MockReply::Timeout(Duration::from_secs(120)),
                ErrorKind::ModelTimeout,
            ),
        ];

        for (reply, kind) in cases {
            let root = tempfile::tempdir().unwrap();
            let pipeline = Pipeline::new(
                MockOcrBackend::with_lines(SAMPLE_LINES),
                MockCompletionClient::with_reply(reply),
            )
            .with_staging_root(root.path());

            let err = pipeline.extract(&rgba_document("scan.png")).await.unwrap_err();
            assert_eq!(err.kind(), kind);
            assert_eq!(staged_entries(root.path()), 0);
        }
    }

    #[tokio::test]
    async fn test_canonical_png_skips_normalizer() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            MockOcrBackend::with_lines(SAMPLE_LINES),
            MockCompletionClient::with_response(SAMPLE_COMPLETION),
        )
        .with_staging_root(root.path());

        let result = pipeline.extract(&rgb_document("scan.png", 4)).await.unwrap();
        assert!(!result.normalized);
        let seen = pipeline.backend().seen_paths();
        assert_eq!(seen[0].file_name().unwrap(), "source.png");

        let result = pipeline.extract(&rgba_document("scan.png")).await.unwrap();
        assert!(result.normalized);
        let seen = pipeline.backend().seen_paths();
        assert_eq!(seen[1].file_name().unwrap(), "source_processed.png");
    }

    #[tokio::test]
    async fn test_staging_named_after_request_not_upload() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            MockOcrBackend::with_lines(SAMPLE_LINES),
            MockCompletionClient::with_response(SAMPLE_COMPLETION),
        )
        .with_staging_root(root.path());

        let result = pipeline
            .extract(&rgba_document("../customer invoice.png"))
            .await
            .unwrap();

        let seen = pipeline.backend().seen_paths();
        let staging_dir = seen[0].parent().unwrap();
        assert_eq!(staging_dir.parent().unwrap(), root.path());
        let dir_name = staging_dir.file_name().unwrap().to_str().unwrap();
        assert!(dir_name.starts_with(&format!("tally-{}-", result.request_id)));
    }

    /// Reads the staged image and reports its width as the only line.
    struct WidthBackend;

    impl OcrBackend for WidthBackend {
        fn name(&self) -> &str {
            "width"
        }

        fn detect(&self, path: &Path) -> std::result::Result<Vec<Detection>, OcrError> {
            let image = image::open(path).map_err(|e| OcrError::UnreadableImage {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(vec![Detection {
                region: [0.0; 8],
                text: format!("width={}", image.width()),
                confidence: 1.0,
            }])
        }
    }

    /// Copies the `width=N` line of the prompt into `invoiceId` after a delay.
    struct EchoClient {
        delay: Duration,
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str) -> std::result::Result<String, ModelError> {
            tokio::time::sleep(self.delay).await;
            let id = prompt
                .lines()
                .find_map(|l| l.strip_prefix("width="))
                .unwrap_or_default();
            Ok(format!(r#"{{"invoiceId": "{}"}}"#, id))
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_with_same_filename_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            WidthBackend,
            EchoClient {
                delay: Duration::from_millis(20),
            },
        )
        .with_staging_root(root.path());

        let narrow = rgb_document("invoice.png", 3);
        let wide = rgb_document("invoice.png", 9);
        let (a, b) = tokio::join!(pipeline.extract(&narrow), pipeline.extract(&wide));

        assert_eq!(a.unwrap().record.invoice_id, "3");
        assert_eq!(b.unwrap().record.invoice_id, "9");
        assert_eq!(staged_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            WidthBackend,
            EchoClient {
                delay: Duration::from_secs(60),
            },
        )
        .with_staging_root(root.path());

        let document = rgba_document("scan.png");
        let outcome =
            tokio::time::timeout(Duration::from_millis(50), pipeline.extract(&document)).await;

        assert!(outcome.is_err());
        assert_eq!(staged_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_canonical_png_under_any_name() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            WidthBackend,
            EchoClient {
                delay: Duration::ZERO,
            },
        )
        .with_staging_root(root.path());

        for name in ["invoice", "scan.jpg", "photo.jpeg", "scan.PNG"] {
            let result = pipeline
                .extract(&rgb_document(name, 7))
                .await
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(result.record.invoice_id, "7", "{name}");
            assert!(!result.normalized, "{name}");
        }
        assert_eq!(staged_entries(root.path()), 0);
    }

    /// Blocks the calling thread for a while before reporting one line.
    struct SlowBackend(Duration);

    impl OcrBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        fn detect(&self, _path: &Path) -> std::result::Result<Vec<Detection>, OcrError> {
            std::thread::sleep(self.0);
            Ok(vec![Detection {
                region: [0.0; 8],
                text: "Invoice #123".to_string(),
                confidence: 1.0,
            }])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_slow_ocr_leaves_executor_free() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            SlowBackend(Duration::from_millis(300)),
            MockCompletionClient::with_response(SAMPLE_COMPLETION),
        )
        .with_staging_root(root.path());
        let document = rgba_document("scan.png");

        let ticker = tokio::spawn(async {
            let start = Instant::now();
            for _ in 0..10 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            start.elapsed()
        });
        pipeline.extract(&document).await.unwrap();
        assert!(ticker.await.unwrap() < Duration::from_millis(250));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_cancel_during_ocr_returns_promptly() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            SlowBackend(Duration::from_millis(300)),
            MockCompletionClient::with_response(SAMPLE_COMPLETION),
        )
        .with_staging_root(root.path());
        let document = rgba_document("scan.png");

        let start = Instant::now();
        let outcome =
            tokio::time::timeout(Duration::from_millis(50), pipeline.extract(&document)).await;
        assert!(outcome.is_err());
        assert!(start.elapsed() < Duration::from_millis(250));
        assert!(pipeline.client().prompts().is_empty());

        // Removed once the detached OCR call returns.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(staged_entries(root.path()), 0);
    }

    #[test]
    fn test_recognize_only() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            MockOcrBackend::with_lines(SAMPLE_LINES),
            MockCompletionClient::with_response(SAMPLE_COMPLETION),
        )
        .with_staging_root(root.path());

        let text = pipeline.recognize(&rgba_document("scan.png")).unwrap();
        assert_eq!(text.lines().len(), 5);
        assert!(pipeline.client().prompts().is_empty());
        assert_eq!(staged_entries(root.path()), 0);
    }
}
