//! Vision pipeline end-to-end against a mocked OpenRouter.

use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;
use std::path::Path;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use errata_core::SolveStatus;
use errata_inference::mock::MockCompletionBackend;
use errata_inference::openrouter::{OpenRouterClient, OpenRouterConfig};
use errata_inference::{suggest_subject_and_tags, VisionPipeline, NO_MISTAKES_MESSAGE};

fn write_page(dir: &Path, name: &str, w: u32, h: u32) {
    RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
        .save_with_format(dir.join(name), ImageFormat::Png)
        .unwrap();
}

fn completion(content: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

#[tokio::test]
async fn test_pipeline_detects_crops_and_reconciles() {
    let mock_server = MockServer::start().await;
    let uploads = tempfile::tempdir().unwrap();
    write_page(uploads.path(), "page0.png", 400, 300);
    write_page(uploads.path(), "page1.png", 200, 200);

    let detection = json!({
        "mistakes": [
            {
                "image_index": 1,
                "bbox": {"x": 0.1, "y": 0.1, "w": 0.5, "h": 0.5},
                "ocr_question": "2x + 3 = 7",
                "ocr_answer": "x = 5",
                "has_correction": true,
                "correction_text": "x = 2",
                "correction_bbox": {"x": 0.6, "y": 0.1, "w": 0.3, "h": 0.2},
                "has_diagram": false,
                "diagram_bbox": null,
                "confidence": 0.85
            },
            {
                "image_index": 7,
                "bbox": {},
                "ocr_question": "unreadable",
                "has_correction": false,
                "confidence": 0.3
            }
        ]
    });
    let fenced = format!("```json\n{}\n```", detection);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Detect all WRONG marks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&fenced)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("second-pass quality check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"ocr_question": "2x + 3 = 7 (refined)", "status": "SOLVED", "confidence": 0.92}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = OpenRouterClient::new(OpenRouterConfig {
        base_url: mock_server.uri(),
        api_key: "k".to_string(),
        ..Default::default()
    })
    .unwrap();

    let pipeline = VisionPipeline::new(&client, uploads.path(), "qwen/qwen3.5-397b-a17b");
    let outcome = pipeline
        .run(&["page0.png".to_string(), "page1.png".to_string()])
        .await;

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.mistakes.len(), 2);

    let first = &outcome.mistakes[0];
    assert_eq!(first.index, 0);
    assert_eq!(first.image_index, 1);
    assert_eq!(first.ocr_question, "2x + 3 = 7 (refined)");
    assert_eq!(first.ocr_answer.as_deref(), Some("x = 5"));
    assert_eq!(first.status, SolveStatus::Solved);
    assert!((first.confidence - 0.92).abs() < 1e-9);
    assert!(!first.needs_user_edit);
    let crop = first.crop_image_path.as_deref().unwrap();
    assert!(crop.starts_with("crops/crop_"));
    let crop_img = image::open(uploads.path().join(crop)).unwrap();
    assert_eq!((crop_img.width(), crop_img.height()), (100, 100));
    assert!(first.correction_image_path.is_some());
    assert!(first.diagram_image_path.is_none());

    // Out-of-range image index falls back to page 0; an empty bbox yields no crop.
    let second = &outcome.mistakes[1];
    assert_eq!(second.image_index, 0);
    assert!(second.crop_image_path.is_none());
    assert_eq!(second.bbox_json, "{}");
    assert_eq!(second.status, SolveStatus::Unsolved);
    assert!(second.needs_user_edit);
}

#[tokio::test]
async fn test_pipeline_reports_no_mistakes() {
    let uploads = tempfile::tempdir().unwrap();
    write_page(uploads.path(), "p.png", 50, 50);
    let backend = MockCompletionBackend::new().with_vision_reply(r#"{"mistakes": []}"#);

    let outcome = VisionPipeline::new(&backend, uploads.path(), "m")
        .run(&["p.png".to_string()])
        .await;

    assert!(outcome.mistakes.is_empty());
    assert_eq!(outcome.message.as_deref(), Some(NO_MISTAKES_MESSAGE));
    assert_eq!(backend.call_count("vision"), 1);
}

#[tokio::test]
async fn test_pipeline_detection_failure_is_reported() {
    let uploads = tempfile::tempdir().unwrap();
    write_page(uploads.path(), "p.png", 50, 50);
    let backend = MockCompletionBackend::new().with_vision_reply("I see a cat.");

    let outcome = VisionPipeline::new(&backend, uploads.path(), "m")
        .run(&["p.png".to_string()])
        .await;

    assert!(outcome.mistakes.is_empty());
    let err = outcome.error.unwrap();
    assert!(err.starts_with("Detection failed: "), "{}", err);
}

#[tokio::test]
async fn test_failed_reconciliation_flags_low_confidence_only() {
    let uploads = tempfile::tempdir().unwrap();
    write_page(uploads.path(), "p.png", 100, 100);
    let detection = json!({"mistakes": [
        {"bbox": {"x": 0, "y": 0, "w": 0.5, "h": 0.5}, "ocr_question": "a", "confidence": 0.9},
        {"bbox": {"x": 0.5, "y": 0.5, "w": 0.5, "h": 0.5}, "ocr_question": "b", "confidence": 0.4}
    ]});
    let backend = MockCompletionBackend::new()
        .with_vision_reply(detection.to_string())
        .with_vision_error("timeout")
        .with_vision_reply("not json");

    let outcome = VisionPipeline::new(&backend, uploads.path(), "m")
        .run(&["p.png".to_string()])
        .await;

    assert_eq!(outcome.mistakes.len(), 2);
    assert!(!outcome.mistakes[0].needs_user_edit);
    assert!(outcome.mistakes[1].needs_user_edit);
    assert_eq!(outcome.mistakes[0].ocr_question, "a");
    assert_eq!(backend.call_count("vision"), 3);
}

#[tokio::test]
async fn test_missing_upload_fails_detection() {
    let uploads = tempfile::tempdir().unwrap();
    let backend = MockCompletionBackend::new();

    let outcome = VisionPipeline::new(&backend, uploads.path(), "m")
        .run(&["missing.png".to_string()])
        .await;

    assert!(outcome.error.is_some());
    assert_eq!(backend.call_count("vision"), 0);
}

#[tokio::test]
async fn test_suggestion_parses_and_falls_back() {
    let pipeline_items = {
        let uploads = tempfile::tempdir().unwrap();
        write_page(uploads.path(), "p.png", 40, 40);
        let backend = MockCompletionBackend::new().with_vision_reply(
            r#"{"mistakes": [{"ocr_question": "sin 30°", "ocr_answer": "1", "confidence": 0.9}]}"#,
        );
        VisionPipeline::new(&backend, uploads.path(), "m")
            .run(&["p.png".to_string()])
            .await
            .mistakes
    };

    let backend = MockCompletionBackend::new()
        .with_chat_reply("```\n{\"subject\": \"数学\", \"tags\": [\"三角函数\"]}\n```")
        .with_chat_error("down");

    let ok = suggest_subject_and_tags(&backend, &pipeline_items, "openai/gpt-5-nano").await;
    assert_eq!(ok.subject, "数学");
    assert_eq!(ok.tags, vec!["三角函数".to_string()]);

    let failed = suggest_subject_and_tags(&backend, &pipeline_items, "openai/gpt-5-nano").await;
    assert_eq!(failed.subject, "");
    assert!(failed.tags.is_empty());

    let calls = backend.get_calls();
    assert!(calls[0].input.contains("Question: sin 30°, Answer: 1"));
    assert_eq!(calls[0].options.max_tokens, 500);
}
