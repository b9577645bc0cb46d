mod common;

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use common::mocks::{MockReply, MockValidationService};
use jats_validator::output::PanelState;
use jats_validator::{
    OrchestratorConfig, Phase, Position, Severity, TextBuffer, ValidationError, ValidationKind,
    Workbench, WorkbenchConfig,
};

fn numbered_article(lines: usize) -> String {
    let mut text = String::from("<article>\n");
    for i in 1..lines {
        text.push_str(&format!("<p>{}</p>\n", i));
    }
    text.push_str("</article>");
    text
}

fn start(service: &MockValidationService, format_on_load: bool) -> Workbench<TextBuffer> {
    Workbench::start(
        TextBuffer::new(),
        service.client(),
        WorkbenchConfig {
            format_on_load,
            orchestrator: OrchestratorConfig::default(),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_edit_to_annotations_round_trip() {
    let service = MockValidationService::new();
    service
        .reply(
            ValidationKind::Dtd,
            MockReply::json(json!({"errors": [{"message": "bad", "line": 5, "column": 2}]})),
        )
        .reply(
            ValidationKind::Schematron,
            MockReply::json(json!({"results": {
                "warnings": [{"description": "ERROR: missing id", "line": 10}],
                "passed": [{}]
            }})),
        );
    let mut bench = start(&service, false);

    assert!(bench.load_text(&numbered_article(20)));
    let snapshot = bench.settled().await.unwrap();

    assert_eq!(snapshot.phase, Phase::Ready);
    let markers = bench.editor().widget().markers();
    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0].from, Position::new(4, 2));
    assert_eq!(markers[1].from, Position::new(9, 0));

    let sidebar = bench.sidebar();
    let dtd = sidebar.panel(ValidationKind::Dtd).unwrap();
    assert_eq!(dtd.group(Severity::Error).unwrap().label, "1 error");
    let schematron = sidebar.panel(ValidationKind::Schematron).unwrap();
    assert_eq!(schematron.title, "JATS4R Schematron");
    assert_eq!(schematron.group(Severity::Warning).unwrap().entries[0].message, "missing id");
    assert_eq!(schematron.passed, Some(1));
    assert!(sidebar.has_failures());
}

#[tokio::test(start_paused = true)]
async fn test_selecting_issue_scrolls_to_its_line() {
    let service = MockValidationService::new();
    service.reply(
        ValidationKind::Dtd,
        MockReply::json(json!({"errors": [{"message": "late", "line": 61, "column": 7}]})),
    );
    let mut bench = start(&service, false);
    bench.load_text(&numbered_article(200));
    bench.settled().await.unwrap();

    let y = bench
        .select_issue(ValidationKind::Dtd, Severity::Error, 0)
        .unwrap();

    let widget = bench.editor().widget();
    assert_eq!(widget.selection(), Position::new(60, 0));
    // Centered: (60 * 18 + 61 * 18 - 720) / 2
    assert_eq!(y, 729.0);
    assert_eq!(widget.scroll_top(), 729.0);
}

#[tokio::test(start_paused = true)]
async fn test_pending_panels_while_running() {
    let service = MockValidationService::new();
    service.reply(
        ValidationKind::Schematron,
        MockReply::json(json!({"results": {}})).delayed(Duration::from_secs(10)),
    );
    let mut bench = start(&service, false);
    bench.load_text("<article/>");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let snapshot = bench.subscribe().borrow().clone();
    bench.apply(&snapshot);

    let sidebar = bench.sidebar();
    assert!(sidebar.panel(ValidationKind::Dtd).unwrap().validation_passed());
    assert_eq!(
        sidebar.panel(ValidationKind::Schematron).unwrap().state,
        PanelState::Pending
    );
    assert!(bench.editor().widget().markers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_superseded_failure_shows_no_error_panel() {
    let service = MockValidationService::new();
    service.reply(
        ValidationKind::Dtd,
        MockReply::status(503)
            .delayed(Duration::from_secs(5))
            .uncancellable(),
    );
    let mut bench = start(&service, false);

    bench.load_text("<article>");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    service.reply(
        ValidationKind::Dtd,
        MockReply::json(json!({"errors": [{"message": "unclosed", "line": 1}]})),
    );
    bench.load_text("<article></article");
    bench.settled().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let snapshot = bench.subscribe().borrow().clone();
    assert!(!bench.apply(&snapshot));

    let sidebar = bench.sidebar();
    assert_eq!(sidebar.error, None);
    assert!(sidebar.panels.iter().all(|p| !p.is_failed()));
    let dtd = sidebar.panel(ValidationKind::Dtd).unwrap();
    assert_eq!(dtd.group(Severity::Error).unwrap().entries[0].message, "unclosed");
    assert_eq!(bench.editor().widget().markers().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_format_failure_leaves_content_and_shows_panel() {
    let service = MockValidationService::new();
    service.format_reply(MockReply::text(422, r#"{"error":"malformed"}"#));
    let mut bench = start(&service, false);
    bench.load_text("<article><front></article>");

    let result = bench.reformat().await;

    assert!(matches!(result, Err(ValidationError::ServiceReported { .. })));
    assert_eq!(bench.editor().text(), "<article><front></article>");
    assert_eq!(bench.sidebar().error.as_deref(), Some("ERROR: malformed"));

    // Manual entry clears the error panel
    bench.load_text("<article/>");
    assert_eq!(bench.error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_load_file_formats_before_validating() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("article.xml");
    std::fs::write(&path, "<article><front/></article>").unwrap();

    let service = MockValidationService::new();
    service.format_reply(MockReply::text(200, "<article>\n  <front/>\n</article>"));
    let mut bench = start(&service, true);

    bench.load_file(&path).await.unwrap();
    bench.settled().await.unwrap();

    assert_eq!(service.formatted(), vec!["<article><front/></article>".to_string()]);
    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert!(
        requests
            .iter()
            .all(|r| r.document == "<article>\n  <front/>\n</article>")
    );
}

#[tokio::test(start_paused = true)]
async fn test_load_file_rejects_other_extensions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("article.json");
    std::fs::write(&path, "{}").unwrap();

    let service = MockValidationService::new();
    let mut bench = start(&service, false);

    let error = bench.load_file(&path).await.unwrap_err();
    assert!(matches!(error, ValidationError::InvalidFileExtension { .. }));
    assert_eq!(bench.editor().text(), "");
    assert!(service.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_load_url() {
    let service = MockValidationService::new();
    service.document("https://example.org/article.xml", "<article/>");
    let mut bench = start(&service, false);

    bench.load_url("https://example.org/article.xml").await.unwrap();
    bench.settled().await.unwrap();

    assert_eq!(bench.editor().text(), "<article/>");
    assert_eq!(service.requests().len(), 2);

    let missing = bench.load_url("https://example.org/missing.xml").await;
    assert!(matches!(missing, Err(ValidationError::HttpStatus { status: 404, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_clearing_document_removes_markers() {
    let service = MockValidationService::new();
    service.reply(
        ValidationKind::Dtd,
        MockReply::json(json!({"errors": [{"message": "bad", "line": 1}]})),
    );
    let mut bench = start(&service, false);

    bench.load_text("<article>");
    bench.settled().await.unwrap();
    assert_eq!(bench.editor().widget().markers().len(), 1);

    bench.load_text("");
    let snapshot = bench.settled().await.unwrap();

    assert_eq!(snapshot.phase, Phase::Idle);
    assert!(bench.editor().widget().markers().is_empty());
    assert_eq!(service.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_tasks() {
    let service = MockValidationService::new();
    let mut bench = start(&service, false);
    bench.load_text("<article/>");
    bench.settled().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), bench.shutdown())
        .await
        .expect("workbench did not shut down");
}
