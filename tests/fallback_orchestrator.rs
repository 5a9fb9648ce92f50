//! Fallback chain behaviour with scripted providers.

mod common;

use common::{Script, ScriptedProvider};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use verse_gateway::prompt::{build_prompt, PoemBrief};
use verse_gateway::routing::{ProviderSelector, DIRECT_BACKUP_MODEL, FREE_MODEL_FALLBACKS};
use verse_gateway::{Error, FallbackOrchestrator};

const F0: &str = "google/gemini-2.0-flash-exp:free";
const F1: &str = "meta-llama/llama-3.1-8b-instruct:free";
const F2: &str = "google/gemini-flash-1.5-8b-exp";
const PAID: &str = "openai/gpt-4o-mini";

fn orchestrator(aggregator: &Arc<ScriptedProvider>) -> FallbackOrchestrator {
    FallbackOrchestrator::new(aggregator.clone())
}

#[test]
fn test_free_list_order_is_declared_order() {
    assert_eq!(FREE_MODEL_FALLBACKS, &[F0, F1, F2]);
}

#[tokio::test]
async fn test_jan_primary_serves_without_fallback() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::Chunks(vec!["Madrid, 5 december\n\n", "Lieve Jan,"])),
    );
    let plan = ProviderSelector::default().plan(F0);
    let prompt = build_prompt(&PoemBrief::new("Jan"));

    let generation = orchestrator(&agg)
        .generate(&plan, &prompt, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!generation.fallback_used());
    assert_eq!(generation.model_used, F0);
    assert!(generation.fallback_reason.is_none());
    let text = generation.collect_text().await.unwrap();
    assert!(!text.is_empty());
    assert_eq!(agg.called_models(), vec![F0]);
}

#[tokio::test]
async fn test_jan_primary_throttled_on_first_chunk() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::FirstChunkError(429, "Rate limit exceeded"))
            .script(F1, Script::Chunks(vec!["Lieve Jan,", " Sint denkt aan jou"])),
    );
    let plan = ProviderSelector::default().plan(F0);
    let prompt = build_prompt(&PoemBrief::new("Jan"));

    let generation = orchestrator(&agg)
        .generate(&plan, &prompt, &CancellationToken::new())
        .await
        .unwrap();

    assert!(generation.fallback_used());
    assert_eq!(generation.model_used, F1);
    assert_eq!(generation.fallback_count, 1);
    assert_eq!(
        generation.fallback_reason.as_deref(),
        Some("1 model(s) were busy")
    );
    assert_eq!(
        generation.collect_text().await.unwrap(),
        "Lieve Jan, Sint denkt aan jou"
    );
    assert_eq!(agg.called_models(), vec![F0, F1]);
}

#[tokio::test]
async fn test_kth_candidate_serves_its_own_stream() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::OpenError(429, "Too Many Requests"))
            .script(F1, Script::OpenError(404, "No endpoints found for model"))
            .script(F2, Script::Chunks(vec!["a", "b", "c"])),
    );
    let plan = ProviderSelector::default().plan(F0);

    let generation = orchestrator(&agg)
        .generate(&plan, "p", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(generation.model_used, F2);
    assert_eq!(generation.fallback_count, 2);
    assert_eq!(generation.collect_text().await.unwrap(), "abc");
}

#[tokio::test]
async fn test_empty_stream_counts_as_busy() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::Empty)
            .script(F1, Script::Chunks(vec!["ok"])),
    );
    let plan = ProviderSelector::default().plan(F0);

    let generation = orchestrator(&agg)
        .generate(&plan, "p", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(generation.model_used, F1);
    assert_eq!(generation.fallback_count, 1);
}

#[tokio::test]
async fn test_fatal_error_stops_the_chain() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::OpenError(401, "No auth credentials found"))
            .script(F1, Script::Chunks(vec!["never"])),
    );
    let plan = ProviderSelector::default().plan(F0);

    let err = orchestrator(&agg)
        .generate(&plan, "p", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Remote { status: 401, .. }));
    assert_eq!(agg.called_models(), vec![F0]);
}

#[tokio::test]
async fn test_paid_primary_is_tried_once() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(PAID, Script::OpenError(429, "Rate limit exceeded"))
            .script(F0, Script::Chunks(vec!["never"])),
    );
    let backup = Arc::new(ScriptedProvider::new("gemini"));
    let selector = ProviderSelector::default().with_backup(DIRECT_BACKUP_MODEL);
    let plan = selector.plan(PAID);
    assert_eq!(plan.len(), 1);
    assert!(!plan.fallback_enabled);

    let err = orchestrator(&agg)
        .with_backup(backup.clone())
        .generate(&plan, "p", &CancellationToken::new())
        .await
        .unwrap_err();

    // Returned as-is, not wrapped as exhaustion.
    assert!(matches!(err, Error::Remote { status: 429, .. }));
    assert_eq!(agg.called_models(), vec![PAID]);
    assert!(backup.called_models().is_empty());
}

#[tokio::test]
async fn test_backup_gets_exactly_one_attempt_and_its_error_is_final() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::OpenError(429, "busy"))
            .script(F1, Script::OpenError(429, "busy"))
            .script(F2, Script::FirstChunkError(429, "busy")),
    );
    let backup = Arc::new(
        ScriptedProvider::new("gemini")
            .script(DIRECT_BACKUP_MODEL, Script::OpenError(429, "RESOURCE_EXHAUSTED")),
    );
    let plan = ProviderSelector::default()
        .with_backup(DIRECT_BACKUP_MODEL)
        .plan(F0);

    let err = orchestrator(&agg)
        .with_backup(backup.clone())
        .generate(&plan, "p", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(agg.called_models(), vec![F0, F1, F2]);
    assert_eq!(backup.called_models(), vec![DIRECT_BACKUP_MODEL]);
    match &err {
        Error::Exhausted { attempts, .. } => assert_eq!(*attempts, 4),
        other => panic!("expected exhaustion, got {:?}", other),
    }
    match err.last_attempt() {
        Error::Remote {
            provider, message, ..
        } => {
            assert_eq!(provider, "gemini");
            assert_eq!(message, "RESOURCE_EXHAUSTED");
        }
        other => panic!("expected backup error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_backup_success_is_reported_as_direct_gemini() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::OpenError(429, "busy"))
            .script(F1, Script::Empty)
            .script(F2, Script::OpenError(400, "invalid model")),
    );
    let backup = Arc::new(
        ScriptedProvider::new("gemini").script(DIRECT_BACKUP_MODEL, Script::Chunks(vec!["Hoi"])),
    );
    let plan = ProviderSelector::default()
        .with_backup(DIRECT_BACKUP_MODEL)
        .plan(F0);

    let generation = orchestrator(&agg)
        .with_backup(backup)
        .generate(&plan, "p", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(generation.model_used, "direct-gemini");
    assert!(generation.fallback_used());
    assert_eq!(
        generation.fallback_reason.as_deref(),
        Some("All free models were busy, used backup")
    );
    assert_eq!(generation.collect_text().await.unwrap(), "Hoi");
}

#[tokio::test]
async fn test_exhaustion_without_backup() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::OpenError(429, "busy"))
            .script(F1, Script::OpenError(429, "busy"))
            .script(F2, Script::OpenError(429, "still busy")),
    );
    let plan = ProviderSelector::default().plan(F0);

    let err = orchestrator(&agg)
        .generate(&plan, "p", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Exhausted { attempts: 3, .. }));
    assert!(matches!(
        err.last_attempt(),
        Error::Remote { message, .. } if message == "still busy"
    ));
}

#[tokio::test]
async fn test_orchestrator_disables_client_retries() {
    let agg = Arc::new(ScriptedProvider::new("openrouter").script(F0, Script::Chunks(vec!["x"])));
    let plan = ProviderSelector::default().plan(F0);

    orchestrator(&agg)
        .with_temperature(0.5)
        .generate(&plan, "p", &CancellationToken::new())
        .await
        .unwrap();

    let calls = agg.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].max_retries, 0);
    assert!((calls[0].temperature - 0.5).abs() < f64::EPSILON);
    assert_eq!(calls[0].prompt, "p");
}

#[tokio::test]
async fn test_cancel_while_waiting_for_first_chunk() {
    let agg = Arc::new(
        ScriptedProvider::new("openrouter")
            .script(F0, Script::Hang)
            .script(F1, Script::Chunks(vec!["never"])),
    );
    let plan = ProviderSelector::default().plan(F0);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = orchestrator(&agg)
        .generate(&plan, "p", &token)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(agg.called_models(), vec![F0]);
}

#[tokio::test]
async fn test_relay_stops_after_cancellation() {
    let agg = Arc::new(ScriptedProvider::new("openrouter").script(F0, Script::FirstThenHang("Lieve")));
    let plan = ProviderSelector::default().plan(F0);
    let token = CancellationToken::new();

    let mut generation = orchestrator(&agg)
        .generate(&plan, "p", &token)
        .await
        .unwrap();

    let first = generation.stream.next().await.unwrap().unwrap();
    assert_eq!(first, "Lieve");

    token.cancel();
    let next = tokio::time::timeout(Duration::from_secs(1), generation.stream.next())
        .await
        .expect("relay should end promptly after cancellation");
    assert!(next.is_none());
}
