use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audio::PodcastSynthesizer;
use crate::background;
use crate::config::Config;
use crate::error::{ModyfireError, Result};
use crate::export::{renderer_for, AspectRatio, ExportFormat, PdfRenderer, RenderOptions};
use crate::generate::{GenerationClient, GenerationResult};
use crate::parse::{parse, Artifact, ParsedArtifact};
use crate::policy::{Caller, WatermarkPolicy};
use crate::prompt::{build_chat_prompt, build_prompt, build_rewrite_prompt, ChatTurn, PromptParams, PromptSpec};
use crate::request::{ContentRequest, Source};
use crate::storage::{LocalStorage, Storage};
use crate::transcript::{ResolvedTranscript, SourceKind, TranscriptResolver};
use crate::usage::{TokenRates, UsageRecord, UsageSink, WebhookUsageSink};

/// Result of one content generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: ParsedArtifact,
    /// None when the request carried text directly
    pub transcript_kind: Option<SourceKind>,
    pub generation: GenerationSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    pub model_identifier: String,
    pub prompt_token_count: u64,
    pub response_token_count: u64,
}

impl From<&GenerationResult> for GenerationSummary {
    fn from(result: &GenerationResult) -> Self {
        Self {
            model_identifier: result.model_identifier.clone(),
            prompt_token_count: result.prompt_token_count,
            response_token_count: result.response_token_count,
        }
    }
}

impl GenerationOutcome {
    /// Artifact JSON plus resolution and model details.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = self.artifact.to_json();
        if let serde_json::Value::Object(map) = &mut value {
            if let Some(kind) = self.transcript_kind {
                map.insert("transcript_source".into(), serde_json::json!(kind));
            }
            map.insert("model".into(), serde_json::json!(self.generation.model_identifier));
        }
        value
    }
}

pub struct Workflow {
    config: Config,
    resolver: TranscriptResolver,
    generator: GenerationClient,
    usage: Arc<dyn UsageSink>,
    synthesizer: PodcastSynthesizer,
    storage: Box<dyn Storage>,
    watermark: WatermarkPolicy,
    rates: TokenRates,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let resolver = TranscriptResolver::new(config.transcript.clone())?;
        let generator = GenerationClient::new(config.generation.clone())?;
        let usage = Arc::new(WebhookUsageSink::new(config.usage.clone())?);
        let synthesizer = PodcastSynthesizer::from_config(&config.audio)?;
        let storage = Box::new(LocalStorage::from_config(&config.storage));
        Ok(Self::with_parts(config, resolver, generator, usage, synthesizer, storage))
    }

    pub fn with_parts(
        config: Config,
        resolver: TranscriptResolver,
        generator: GenerationClient,
        usage: Arc<dyn UsageSink>,
        synthesizer: PodcastSynthesizer,
        storage: Box<dyn Storage>,
    ) -> Self {
        let watermark = WatermarkPolicy::from_config(&config.policy);
        let rates = TokenRates::from_config(&config.usage);
        Self {
            config,
            resolver,
            generator,
            usage,
            synthesizer,
            storage,
            watermark,
            rates,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve a video reference to text without generating anything.
    pub async fn resolve(&self, reference: &str, language: &str) -> Result<ResolvedTranscript> {
        self.resolver.resolve(reference, language).await
    }

    /// Source to parsed artifact: resolve, prompt, generate, record usage, parse.
    pub async fn generate(&self, request: &ContentRequest, caller: &Caller) -> Result<GenerationOutcome> {
        info!("Generating {} for {} ({})", request.content_type, caller.owner_id(), request.tier);

        let (text, transcript_kind) = match &request.source {
            Source::Video(reference) => {
                let resolved = self.resolver.resolve(reference, &request.language).await?;
                (resolved.text().to_string(), Some(resolved.source_kind()))
            }
            Source::Text(text) if text.trim().is_empty() => {
                return Err(ModyfireError::Unsupported("no source text provided".to_string()));
            }
            Source::Text(text) => (text.clone(), None),
        };

        let params = PromptParams {
            tone: request.tone,
            target_count: request.target_count.clone(),
            is_degraded: transcript_kind.is_some_and(|k| k.is_degraded()),
        };
        let spec = build_prompt(request.content_type, request.tier, &text, &request.language, &params);
        let generation = self.generator.generate(&spec, request.content_type, request.tier).await?;
        self.record_usage(caller, &generation).await;

        let artifact = parse(&generation.raw_text, spec.expected_schema);
        debug!("Parsed {} items (degraded: {})", artifact.len(), artifact.degraded);

        Ok(GenerationOutcome {
            artifact,
            transcript_kind,
            generation: GenerationSummary::from(&generation),
        })
    }

    /// Render an artifact as a document. The watermark decision is made once per call.
    pub async fn export(
        &self,
        artifact: &ParsedArtifact,
        format: ExportFormat,
        theme: Option<&str>,
        aspect_ratio: AspectRatio,
        caller: &Caller,
    ) -> Result<Vec<u8>> {
        let theme = theme.filter(|t| !t.trim().is_empty()).unwrap_or(&self.config.export.default_theme);
        let mut options = RenderOptions::new(theme, aspect_ratio).with_asset_root(&self.config.export.asset_root);
        if self.watermark.applies(caller) {
            options = options.with_watermark(self.config.export.watermark_text.clone());
        }

        let slides = artifact.to_slides();
        let renderer = renderer_for(format);
        let started = std::time::Instant::now();
        let bytes = renderer.render(&slides, &options)?;
        info!(
            "Exported {} slides as {} ({} bytes, {:.2?})",
            slides.len(),
            format.extension(),
            bytes.len(),
            started.elapsed()
        );
        Ok(bytes)
    }

    /// Audio for a podcast script artifact.
    pub async fn podcast(&self, artifact: &ParsedArtifact) -> Result<Vec<u8>> {
        match &artifact.artifact {
            Artifact::Script(lines) => self.synthesizer.synthesize(lines).await,
            _ => Err(ModyfireError::Unsupported("podcast audio needs a podcast script".to_string())),
        }
    }

    /// Restyle text in a tone. Returns plain text.
    pub async fn rewrite(&self, text: &str, tone: &str, caller: &Caller) -> Result<String> {
        if text.trim().is_empty() {
            return Err(ModyfireError::Unsupported("no text to rewrite".to_string()));
        }
        let spec = build_rewrite_prompt(text, tone);
        self.complete_plain(&spec, caller).await
    }

    /// Answer a question about video content, given the conversation so far.
    pub async fn chat(
        &self,
        context: &str,
        history: &[ChatTurn],
        question: &str,
        language: &str,
        caller: &Caller,
    ) -> Result<String> {
        if question.trim().is_empty() {
            return Err(ModyfireError::Unsupported("empty question".to_string()));
        }
        let spec = build_chat_prompt(context, history, question, language);
        self.complete_plain(&spec, caller).await
    }

    pub fn report_pdf(&self, text: &str) -> Result<Vec<u8>> {
        PdfRenderer::new().render_report(text)
    }

    /// Persist an artifact for the caller. Local files expire after the configured delay.
    pub async fn store(&self, caller: &Caller, filename: &str, bytes: &[u8]) -> Result<String> {
        let locator = self.storage.write(caller.owner_id(), filename, bytes).await?;
        let path = Path::new(&locator);
        if path.is_file() {
            background::schedule_removal(path.to_path_buf(), Duration::from_secs(self.config.storage.cleanup_delay_secs));
        }
        Ok(locator)
    }

    /// Remove everything stored for the caller.
    pub async fn purge(&self, caller: &Caller) -> Result<u64> {
        self.storage.delete_all(caller.owner_id()).await
    }

    /// Wait for outstanding background side effects. Their failures were already logged.
    pub async fn flush_background(&self) {
        let handles: Vec<JoinHandle<()>> = self.pending.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn complete_plain(&self, spec: &PromptSpec, caller: &Caller) -> Result<String> {
        let model = self.generator.models().default_model().to_string();
        let generation = self.generator.generate_with_model(spec, &model).await?;
        self.record_usage(caller, &generation).await;
        Ok(generation.raw_text.trim().to_string())
    }

    async fn record_usage(&self, caller: &Caller, generation: &GenerationResult) {
        let record = UsageRecord::new(caller.owner_id(), caller.tier, generation, self.rates);
        let sink = Arc::clone(&self.usage);
        let handle = background::spawn_non_critical("usage-record", async move { sink.record(&record).await });

        let mut pending = self.pending.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MockSpeechEngine, VoiceMap};
    use crate::generate::MockTextGenerator;
    use crate::request::{ContentType, Tier};
    use crate::storage::MockStorage;
    use crate::transcript::{CaptionSegment, MockCaptionSource, MockMetadataSource, SourceError, TrackInfo};
    use crate::usage::MockUsageSink;

    const QUIZ_JSON: &str = r#"```json
[
  {"question": "What does the borrow checker enforce?", "options": ["Aliasing rules", "Formatting", "Naming", "Licensing"], "answer": "Aliasing rules"},
  {"question": "Which keyword moves ownership into a closure?", "options": ["ref", "move", "mut", "dyn"], "answer": "move"}
]
```"#;

    fn generation(text: &str, model: &str) -> GenerationResult {
        GenerationResult {
            raw_text: text.to_string(),
            model_identifier: model.to_string(),
            prompt_token_count: 800,
            response_token_count: 200,
        }
    }

    fn idle_resolver() -> TranscriptResolver {
        TranscriptResolver::with_sources(Box::new(MockCaptionSource::new()), Vec::new())
    }

    fn workflow(
        resolver: TranscriptResolver,
        generator: MockTextGenerator,
        usage: MockUsageSink,
        speech: MockSpeechEngine,
    ) -> Workflow {
        let config = Config::default();
        let generator = GenerationClient::with_generator(Box::new(generator), &config.generation);
        let synthesizer = PodcastSynthesizer::new(Box::new(speech), VoiceMap::from_config(&config.audio));
        Workflow::with_parts(config, resolver, generator, Arc::new(usage), synthesizer, Box::new(MockStorage::new()))
    }

    fn recording_usage(times: usize) -> MockUsageSink {
        let mut usage = MockUsageSink::new();
        usage
            .expect_record()
            .withf(|r| r.prompt_tokens == 800 && r.response_tokens == 200)
            .times(times)
            .returning(|_| Ok(()));
        usage
    }

    #[tokio::test]
    async fn test_quiz_from_text() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_complete()
            .withf(|model, prompt| model == "gemini-2.5-flash" && prompt.contains("borrow checker"))
            .times(1)
            .returning(|model, _| Ok(generation(QUIZ_JSON, model)));

        let workflow = workflow(idle_resolver(), generator, recording_usage(1), MockSpeechEngine::new());
        let request = ContentRequest::new(ContentType::Quiz, Source::Text("Notes about the borrow checker".into()));
        let caller = Caller::authenticated("u-42", Tier::Student, 5);

        let outcome = workflow.generate(&request, &caller).await.unwrap();
        workflow.flush_background().await;

        assert_eq!(outcome.transcript_kind, None);
        assert!(!outcome.artifact.degraded);
        match &outcome.artifact.artifact {
            Artifact::Quiz(questions) => {
                assert_eq!(questions.len(), 2);
                assert_eq!(questions[1].answer, "move");
            }
            other => panic!("expected quiz, got {:?}", other),
        }
        assert_eq!(outcome.to_json()["questions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_video_source_resolves_captions_first() {
        let mut captions = MockCaptionSource::new();
        captions.expect_tracks().times(1).returning(|_| {
            Ok(vec![TrackInfo {
                base_url: "https://captions.test/en".into(),
                language_code: "en".into(),
                kind: None,
            }])
        });
        captions.expect_download().times(1).returning(|_| {
            Ok(vec![CaptionSegment { text: "ownership explained".into(), start: 0.0, duration: 2.0 }])
        });
        let resolver = TranscriptResolver::with_sources(Box::new(captions), Vec::new());

        let mut generator = MockTextGenerator::new();
        generator
            .expect_complete()
            .withf(|model, prompt| model == "gemini-2.5-pro" && prompt.contains("ownership explained"))
            .times(1)
            .returning(|model, _| Ok(generation("# Summary\nOwnership moves values.", model)));

        let workflow = workflow(resolver, generator, recording_usage(1), MockSpeechEngine::new());
        let request = ContentRequest::new(ContentType::Summary, Source::Video("https://youtu.be/dQw4w9WgXcQ".into()))
            .with_tier(Tier::Professor);

        let outcome = workflow.generate(&request, &Caller::anonymous()).await.unwrap();
        workflow.flush_background().await;

        assert_eq!(outcome.transcript_kind, Some(SourceKind::ManualCaptions));
        assert!(matches!(outcome.artifact.artifact, Artifact::Narrative(_)));
    }

    #[tokio::test]
    async fn test_metadata_fallback_marks_prompt_degraded() {
        let mut captions = MockCaptionSource::new();
        captions.expect_tracks().returning(|_| Err(SourceError::Disabled));
        let mut meta = MockMetadataSource::new();
        meta.expect_kind().return_const(SourceKind::MetadataFallback);
        meta.expect_metadata().times(1).returning(|_| {
            Ok(crate::transcript::VideoMetadata {
                title: "Rust in 100 Seconds".into(),
                description: "A fast tour".into(),
                tags: vec![],
                channel: "Fireship".into(),
            })
        });
        let resolver = TranscriptResolver::with_sources(Box::new(captions), vec![Box::new(meta)]);

        let mut generator = MockTextGenerator::new();
        generator
            .expect_complete()
            .withf(|_, prompt| prompt.contains("Rust in 100 Seconds"))
            .times(1)
            .returning(|model, _| Ok(generation("[]", model)));

        let workflow = workflow(resolver, generator, recording_usage(1), MockSpeechEngine::new());
        let request = ContentRequest::new(ContentType::Flashcards, Source::Video("dQw4w9WgXcQ".into()));
        let outcome = workflow.generate(&request, &Caller::anonymous()).await.unwrap();
        workflow.flush_background().await;

        assert_eq!(outcome.transcript_kind, Some(SourceKind::MetadataFallback));
        assert!(!outcome.artifact.is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_skips_usage() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_complete()
            .returning(|_, _| Err(ModyfireError::Generation("quota exceeded".into())));

        let workflow = workflow(idle_resolver(), generator, recording_usage(0), MockSpeechEngine::new());
        let request = ContentRequest::new(ContentType::Quiz, Source::Text("text".into()));
        let err = workflow.generate(&request, &Caller::anonymous()).await.unwrap_err();
        workflow.flush_background().await;
        assert!(matches!(err, ModyfireError::Generation(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_accounting_failure_does_not_fail_generation() {
        let mut generator = MockTextGenerator::new();
        generator.expect_complete().returning(|model, _| Ok(generation(QUIZ_JSON, model)));
        let mut usage = MockUsageSink::new();
        usage
            .expect_record()
            .times(1)
            .returning(|_| Err(ModyfireError::Accounting("webhook down".into())));

        let workflow = workflow(idle_resolver(), generator, usage, MockSpeechEngine::new());
        let request = ContentRequest::new(ContentType::Quiz, Source::Text("text".into()));
        assert!(workflow.generate(&request, &Caller::anonymous()).await.is_ok());
        workflow.flush_background().await;
    }

    #[tokio::test]
    async fn test_empty_text_is_client_error() {
        let workflow = workflow(idle_resolver(), MockTextGenerator::new(), recording_usage(0), MockSpeechEngine::new());
        let request = ContentRequest::new(ContentType::Quiz, Source::Text("   ".into()));
        let err = workflow.generate(&request, &Caller::anonymous()).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_export_watermark_follows_caller() {
        let workflow = workflow(idle_resolver(), MockTextGenerator::new(), recording_usage(0), MockSpeechEngine::new());
        let artifact = parse(QUIZ_JSON, crate::prompt::SchemaKind::Quiz);
        let contains = |bytes: &[u8]| bytes.windows(21).any(|w| w == b"Generated by MODYFIRE");

        let free = workflow
            .export(&artifact, ExportFormat::Pdf, None, AspectRatio::Widescreen, &Caller::anonymous())
            .await
            .unwrap();
        let paid = workflow
            .export(
                &artifact,
                ExportFormat::Pdf,
                Some("dark"),
                AspectRatio::Widescreen,
                &Caller::authenticated("u1", Tier::Professor, 0),
            )
            .await
            .unwrap();
        let low_credit = workflow
            .export(
                &artifact,
                ExportFormat::Pptx,
                Some("ocean"),
                AspectRatio::Square,
                &Caller::authenticated("u2", Tier::Student, 1),
            )
            .await
            .unwrap();

        assert!(free.starts_with(b"%PDF") && contains(&free));
        assert!(paid.starts_with(b"%PDF") && !contains(&paid));
        assert!(low_credit.starts_with(b"PK") && contains(&low_credit));
    }

    #[tokio::test]
    async fn test_podcast_requires_script() {
        let mut speech = MockSpeechEngine::new();
        speech.expect_speak().times(2).returning(|text, _| Ok(text.as_bytes().to_vec()));
        let workflow = workflow(idle_resolver(), MockTextGenerator::new(), recording_usage(0), speech);

        let script = parse(
            r#"[{"speaker": "Alex", "text": "Hi."}, {"speaker": "Sam", "text": "Hello."}]"#,
            crate::prompt::SchemaKind::PodcastScript,
        );
        assert_eq!(workflow.podcast(&script).await.unwrap(), b"Hi.Hello.");

        let quiz = parse(QUIZ_JSON, crate::prompt::SchemaKind::Quiz);
        assert!(workflow.podcast(&quiz).await.unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn test_rewrite_uses_default_model() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_complete()
            .withf(|model, prompt| model == "gemini-2.5-flash" && prompt.contains("to be fun"))
            .times(1)
            .returning(|model, _| Ok(generation("  Rust rocks!  ", model)));

        let workflow = workflow(idle_resolver(), generator, recording_usage(1), MockSpeechEngine::new());
        let out = workflow.rewrite("Rust is good.", "fun", &Caller::anonymous()).await.unwrap();
        workflow.flush_background().await;
        assert_eq!(out, "Rust rocks!");
    }

    #[tokio::test]
    async fn test_store_and_purge_use_owner() {
        let mut storage = MockStorage::new();
        storage
            .expect_write()
            .withf(|owner, name, bytes| owner == "u9" && name == "deck.pdf" && bytes == b"%PDF")
            .times(1)
            .returning(|_, _, _| Ok("mem://u9/deck.pdf".to_string()));
        storage.expect_delete_all().withf(|owner| owner == "u9").times(1).returning(|_| Ok(1));

        let config = Config::default();
        let generator = GenerationClient::with_generator(Box::new(MockTextGenerator::new()), &config.generation);
        let synthesizer = PodcastSynthesizer::new(Box::new(MockSpeechEngine::new()), VoiceMap::default());
        let workflow = Workflow::with_parts(
            config,
            idle_resolver(),
            generator,
            Arc::new(MockUsageSink::new()),
            synthesizer,
            Box::new(storage),
        );

        let caller = Caller::authenticated("u9", Tier::Podcaster, 100);
        assert_eq!(workflow.store(&caller, "deck.pdf", b"%PDF").await.unwrap(), "mem://u9/deck.pdf");
        assert_eq!(workflow.purge(&caller).await.unwrap(), 1);
    }
}
