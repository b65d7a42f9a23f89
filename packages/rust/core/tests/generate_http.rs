//! End-to-end generation over HTTP against mock chat-completion endpoints.

mod common;

use std::sync::Arc;
use std::time::Duration;

use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lessonforge_ai::{CallPolicy, ChatClient, TextGenerator};
use lessonforge_core::{GeneratorConfig, LessonGenerator, ModelRouter, active_sections};
use lessonforge_shared::{
    ClientConfig, FailureKind, LessonParams, LessonType, SectionKind, SectionResult,
    StudentLevel,
};

use common::*;

fn completion(content: &str, model: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "model": model,
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 300, "completion_tokens": 120}
    }))
}

async fn mount_reply(server: &MockServer, marker: &str, content: &str, model: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains(marker))
        .respond_with(completion(content, model))
        .mount(server)
        .await;
}

/// Mount healthy replies for the context calls and `sections`.
async fn mount_lesson(server: &MockServer, sections: &[SectionKind], model: &str) {
    mount_reply(server, ANALYSIS_MARKER, ANALYSIS_REPLY, model).await;
    mount_reply(server, SUMMARY_MARKER, SUMMARY_REPLY, model).await;
    for &kind in sections {
        mount_reply(server, section_marker(kind), &section_reply(kind), model).await;
    }
}

fn client_for(server: &MockServer, name: &str) -> Arc<dyn TextGenerator> {
    let config = ClientConfig {
        name: name.into(),
        base_url: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
        api_key: "sk-test".into(),
        model: format!("{name}-model"),
        request_timeout: Duration::from_secs(5),
    };
    Arc::new(ChatClient::new(config).unwrap())
}

fn config() -> GeneratorConfig {
    GeneratorConfig {
        call_policy: CallPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
        },
        ..GeneratorConfig::default()
    }
}

fn grammar_params() -> LessonParams {
    LessonParams {
        source_text: coffee_source(),
        source_title: None,
        lesson_type: LessonType::Grammar,
        student_level: StudentLevel::B1,
        target_language: "English".into(),
    }
}

#[tokio::test]
async fn http_failure_for_grammar_only_degrades_grammar() {
    let server = MockServer::start().await;

    // Transient failure: the call is retried once, then the template is used.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains(section_marker(SectionKind::Grammar)))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .expect(2)
        .mount(&server)
        .await;

    let active = active_sections(&LessonType::Grammar);
    let others: Vec<SectionKind> = active
        .iter()
        .copied()
        .filter(|k| *k != SectionKind::Grammar)
        .collect();
    mount_lesson(&server, &others, "live-model").await;

    let generator = LessonGenerator::new(config(), ModelRouter::single(client_for(&server, "default")));
    let lesson = generator
        .generate_lesson(&grammar_params(), None)
        .await
        .expect("lesson");

    let kinds: Vec<SectionKind> = lesson.sections.iter().map(SectionResult::kind).collect();
    assert_eq!(kinds, active);

    assert_eq!(lesson.degraded.len(), 1, "{:?}", lesson.degraded);
    let degraded = &lesson.degraded[0];
    assert_eq!(degraded.section, SectionKind::Grammar);
    assert_eq!(degraded.failure, FailureKind::UpstreamFailure);
    assert!(degraded.fallback);
    assert!(degraded.detail.contains("503"));

    for kind in others {
        assert!(!lesson.is_degraded(kind), "{kind} should be live");
    }

    match lesson.section(SectionKind::Grammar) {
        Some(SectionResult::Grammar(grammar)) => {
            assert_eq!(grammar.focus, "Past simple and present perfect");
            assert!(grammar.exercises.len() >= 3);
        }
        other => panic!("expected grammar, got {other:?}"),
    }

    assert_eq!(lesson.usage.failed_calls, 1);
    assert!(lesson.usage.models.contains("live-model"));
}

#[tokio::test]
async fn sections_can_be_routed_to_another_endpoint() {
    let default_server = MockServer::start().await;
    let grammar_server = MockServer::start().await;

    let active = active_sections(&LessonType::Grammar);
    let others: Vec<SectionKind> = active
        .iter()
        .copied()
        .filter(|k| *k != SectionKind::Grammar)
        .collect();
    mount_lesson(&default_server, &others, "general-model").await;
    mount_reply(
        &grammar_server,
        section_marker(SectionKind::Grammar),
        &section_reply(SectionKind::Grammar),
        "grammar-model",
    )
    .await;

    let router = ModelRouter::single(client_for(&default_server, "default"))
        .route(SectionKind::Grammar, client_for(&grammar_server, "grammar"));
    let lesson = LessonGenerator::new(config(), router)
        .generate_lesson(&grammar_params(), None)
        .await
        .expect("lesson");

    assert!(lesson.degraded.is_empty(), "{:?}", lesson.degraded);
    match lesson.section(SectionKind::Grammar) {
        Some(SectionResult::Grammar(grammar)) => assert_eq!(grammar.focus, "Past simple"),
        other => panic!("expected grammar, got {other:?}"),
    }
    let models: Vec<&str> = lesson.usage.models.iter().map(String::as_str).collect();
    assert_eq!(models, vec!["general-model", "grammar-model"]);
}
