//! Production run integration tests
//!
//! Runs the orchestrator end to end against a scripted provider.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use script_narrator::narration::ArtifactFormat;
use script_narrator::text::{PronunciationRule, Wrapper};
use script_narrator::translation::Translator;
use script_narrator::{Error, NarrationOrchestrator, NarrationState, ProductionRequest, Result, VoiceSelection};

mod common;
use common::{MockProvider, chunk_audio, fast_settings};

fn request(script: impl Into<String>) -> ProductionRequest {
    ProductionRequest {
        script: script.into(),
        ..ProductionRequest::default()
    }
}

struct UppercaseTranslator {
    calls: AtomicUsize,
    fail: bool,
}

impl UppercaseTranslator {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
        }
    }
}

#[async_trait]
impl Translator for UppercaseTranslator {
    async fn translate(&self, text: &str, _target_language: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Translation("service unavailable".to_string()));
        }
        Ok(text.to_uppercase())
    }
}

#[tokio::test]
async fn test_long_script_renders_three_whitespace_bounded_chunks() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(3000));
    let provider = MockProvider::pcm();

    let artifact = orchestrator
        .produce(&provider, request("Hello. ".repeat(1000)))
        .await
        .unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 3);
    for chunk in &calls {
        assert!(chunk.chars().count() <= 3000);
        assert!(chunk.ends_with('.'), "chunk should end at a sentence: {:?}", &chunk[chunk.len() - 5..]);
        assert!(chunk.starts_with("Hello"));
    }

    assert_eq!(artifact.chunk_count, 3);
    assert_eq!(artifact.format, ArtifactFormat::Wav);
    assert_eq!(artifact.mime_type(), "audio/wav");

    let reader = hound::WavReader::new(Cursor::new(&artifact.bytes)).unwrap();
    assert_eq!(reader.spec().sample_rate, 24_000);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.len(), 6);

    let mut expected = chunk_audio(1);
    expected.extend(chunk_audio(2));
    expected.extend(chunk_audio(3));
    assert_eq!(&artifact.bytes[44..], expected.as_slice());

    assert_eq!(orchestrator.state(), NarrationState::Ready);
    assert!(orchestrator.last_artifact().is_some());
}

#[tokio::test]
async fn test_wrapped_script_chunks_are_rewrapped() {
    let body = "Welcome to the tour. ".repeat(10);
    let script = format!("<speak>{body}</speak>");
    let orchestrator = NarrationOrchestrator::new(fast_settings(120));
    let provider = MockProvider::pcm();

    orchestrator.produce(&provider, request(script)).await.unwrap();

    let calls = provider.calls();
    assert!(calls.len() >= 2);
    for chunk in &calls {
        assert!(chunk.starts_with("<speak>"), "{chunk}");
        assert!(chunk.ends_with("</speak>"), "{chunk}");
        assert_eq!(chunk.matches("<speak>").count(), 1);
        assert_eq!(chunk.matches("</speak>").count(), 1);
        assert!(Wrapper::detect(chunk).is_some());
    }
}

#[tokio::test]
async fn test_pronunciation_rules_reach_provider() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(3000));
    let provider = MockProvider::pcm();

    let run = ProductionRequest {
        script: "Ask Gemini about Gemini. Geminis are twins.".to_string(),
        rules: vec![PronunciationRule::new("gemini", "Jeminai")],
        ..ProductionRequest::default()
    };
    orchestrator.produce(&provider, run).await.unwrap();

    assert_eq!(provider.calls(), vec!["Ask Jeminai about Jeminai. Geminis are twins."]);
}

#[tokio::test]
async fn test_rewrite_happens_before_chunking() {
    // "Gemini" straddles the 20-char window in the unrewritten script
    let orchestrator = NarrationOrchestrator::new(fast_settings(20));
    let provider = MockProvider::pcm();

    let run = ProductionRequest {
        script: "aaaa bbbb cccc Gemini dddd".to_string(),
        rules: vec![PronunciationRule::new("Gemini", "Jeminai-sama")],
        ..ProductionRequest::default()
    };
    orchestrator.produce(&provider, run).await.unwrap();

    assert_eq!(provider.calls(), vec!["aaaa bbbb cccc", "Jeminai-sama dddd"]);
}

#[tokio::test]
async fn test_chunk_failure_names_chunk_and_keeps_no_artifact() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(10));

    // A previous success must not survive a failed run
    orchestrator
        .produce(&MockProvider::pcm(), request("first run"))
        .await
        .unwrap();
    assert!(orchestrator.last_artifact().is_some());

    let provider = MockProvider::pcm().failing_on(2);
    let script = "aaaa bbbb cccc dddd eeee ffff gggg hhhh";
    let err = orchestrator.produce(&provider, request(script)).await.unwrap_err();

    match &err {
        Error::ChunkSynthesis { index, total, source } => {
            assert_eq!(*index, 2);
            assert_eq!(*total, 4);
            assert!(matches!(**source, Error::ProviderRejected { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("chunk 2 of 4"));
    assert_eq!(err.chunk_index(), Some(2));

    // Fail fast: chunks 3 and 4 are never dispatched
    assert_eq!(provider.calls().len(), 2);
    assert!(orchestrator.last_artifact().is_none());
    assert!(matches!(orchestrator.state(), NarrationState::Failed { .. }));
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_empty_script_is_rejected_without_dispatch() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(3000));
    let provider = MockProvider::pcm();

    let err = orchestrator.produce(&provider, request("  \n\t ")).await.unwrap_err();
    assert!(matches!(err, Error::EmptyScript));
    assert!(provider.calls().is_empty());
    assert_eq!(orchestrator.state(), NarrationState::Idle);
}

#[tokio::test]
async fn test_mpeg_chunks_pass_through() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(10));
    let provider = MockProvider::mpeg();

    let run = ProductionRequest {
        script: "aaaa bbbb cccc".to_string(),
        voice: VoiceSelection::External {
            voice_id: "voice-123".to_string(),
        },
        ..ProductionRequest::default()
    };
    let artifact = orchestrator.produce(&provider, run).await.unwrap();

    assert_eq!(artifact.format, ArtifactFormat::Mp3);
    assert_eq!(artifact.extension(), "mp3");
    let mut expected = chunk_audio(1);
    expected.extend(chunk_audio(2));
    assert_eq!(artifact.bytes, expected);
}

#[tokio::test]
async fn test_clone_service_requires_external_voice() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(3000));
    let provider = MockProvider::mpeg();

    let err = orchestrator.produce(&provider, request("hello")).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_second_run_is_busy() {
    let orchestrator = Arc::new(NarrationOrchestrator::new(fast_settings(10)));
    let provider = Arc::new(MockProvider::pcm().with_delay(Duration::from_millis(50)));

    let background = {
        let orchestrator = Arc::clone(&orchestrator);
        let provider = Arc::clone(&provider);
        tokio::spawn(async move {
            orchestrator
                .produce(provider.as_ref(), request("aaaa bbbb cccc"))
                .await
        })
    };

    let mut states = orchestrator.subscribe();
    states
        .wait_for(|s| matches!(s, NarrationState::Synthesizing { .. }))
        .await
        .unwrap();

    let err = orchestrator
        .produce(&MockProvider::pcm(), request("other"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Busy));

    assert!(background.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_abort_stops_between_chunks() {
    let orchestrator = Arc::new(NarrationOrchestrator::new(fast_settings(5)));
    let provider = Arc::new(MockProvider::pcm().with_delay(Duration::from_millis(50)));

    let background = {
        let orchestrator = Arc::clone(&orchestrator);
        let provider = Arc::clone(&provider);
        tokio::spawn(async move {
            orchestrator
                .produce(provider.as_ref(), request("aaaa bbbb cccc dddd eeee ffff"))
                .await
        })
    };

    let mut states = orchestrator.subscribe();
    states
        .wait_for(|s| matches!(s, NarrationState::Synthesizing { .. }))
        .await
        .unwrap();
    orchestrator.abort();

    let err = background.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Aborted));
    assert!(provider.calls().len() < 6);
    assert_eq!(orchestrator.state(), NarrationState::Idle);
    assert!(orchestrator.last_artifact().is_none());
}

#[tokio::test]
async fn test_dropped_run_returns_to_idle() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(3000));
    let provider = MockProvider::pcm().with_delay(Duration::from_secs(5));

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        orchestrator.produce(&provider, request("slow chunk")),
    )
    .await;
    assert!(outcome.is_err());

    assert_eq!(orchestrator.state(), NarrationState::Idle);
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_pause_between_chunks() {
    let mut settings = fast_settings(5);
    settings.chunk_pause = Duration::from_millis(40);
    let orchestrator = NarrationOrchestrator::new(settings);
    let provider = MockProvider::pcm();

    let started = Instant::now();
    orchestrator
        .produce(&provider, request("aaaa bbbb cccc"))
        .await
        .unwrap();

    // Two pauses for three chunks, none after the last
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test]
async fn test_translation_runs_for_other_languages() {
    let translator = Arc::new(UppercaseTranslator::new(false));
    let orchestrator =
        NarrationOrchestrator::new(fast_settings(3000)).with_translator(Arc::clone(&translator) as Arc<dyn Translator>);
    let provider = MockProvider::pcm();

    let run = ProductionRequest {
        script: "good evening".to_string(),
        language: Some("fr".to_string()),
        ..ProductionRequest::default()
    };
    orchestrator.produce(&provider, run).await.unwrap();
    assert_eq!(provider.calls(), vec!["GOOD EVENING"]);

    // Default language skips the pre-pass
    orchestrator.produce(&provider, request("good night")).await.unwrap();
    assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_translation_failure_falls_back_to_source() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(3000))
        .with_translator(Arc::new(UppercaseTranslator::new(true)));
    let provider = MockProvider::pcm();

    let run = ProductionRequest {
        script: "good evening".to_string(),
        language: Some("de".to_string()),
        ..ProductionRequest::default()
    };
    orchestrator.produce(&provider, run).await.unwrap();
    assert_eq!(provider.calls(), vec!["good evening"]);
}

#[tokio::test]
async fn test_artifact_written_to_directory() {
    let orchestrator = NarrationOrchestrator::new(fast_settings(3000));
    let artifact = orchestrator
        .produce(&MockProvider::pcm(), request("short"))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = artifact.write_to(dir.path(), "episode").await.unwrap();
    assert_eq!(path.extension().unwrap(), "wav");
    assert_eq!(std::fs::read(path).unwrap(), artifact.bytes);
}
