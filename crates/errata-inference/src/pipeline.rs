//! Mistake extraction from homework photos: detect, crop, reconcile.
//!
//! 1. **Detect**: every page goes to the vision model in one call, which
//!    returns the wrong marks it found with bounding boxes and OCR text.
//! 2. **Crop**: each mark's question region (plus correction and diagram
//!    regions when present) is cut out and saved under `crops/`.
//! 3. **Reconcile**: each crop is sent back alone with the first-pass data
//!    so the model can fix OCR errors and re-score its confidence.
//!
//! Only a failed detection fails the run. Crop and reconcile failures
//! degrade the affected item and flag it for manual editing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use errata_core::defaults::{
    CROPS_SUBDIR, DEFAULT_CONFIDENCE, NEEDS_EDIT_CONFIDENCE, VISION_MAX_DIM,
};
use errata_core::{
    CompletionBackend, CompletionOptions, Error, MistakeItemInput, PromptMessage, Result,
    SolveStatus,
};

use crate::image_ops::{crop_to_file, resize_to_base64, BBox};
use crate::json_reply::parse_json_reply;
use crate::prompts::{
    reconciliation_prompt, suggestion_options, suggestion_prompt, DETECTION_PROMPT,
};

/// Message returned when detection succeeds but finds nothing.
pub const NO_MISTAKES_MESSAGE: &str = "No mistakes detected in the uploaded images.";

/// One detected mistake, ready for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedMistake {
    pub index: usize,
    pub image_index: usize,
    pub crop_image_path: Option<String>,
    pub correction_image_path: Option<String>,
    pub diagram_image_path: Option<String>,
    pub ocr_question: String,
    pub ocr_answer: Option<String>,
    pub correction_text: Option<String>,
    pub status: SolveStatus,
    pub has_diagram: bool,
    pub bbox_json: String,
    pub confidence: f64,
    pub needs_user_edit: bool,
}

impl From<DetectedMistake> for MistakeItemInput {
    fn from(m: DetectedMistake) -> Self {
        MistakeItemInput {
            crop_image_path: m.crop_image_path,
            correction_image_path: m.correction_image_path,
            diagram_image_path: m.diagram_image_path,
            ocr_question: m.ocr_question,
            ocr_answer: m.ocr_answer,
            status: m.status,
            bbox_json: Some(m.bbox_json),
            confidence: m.confidence,
            needs_user_edit: m.needs_user_edit,
        }
    }
}

/// Result of a pipeline run.
///
/// Serializes as `{mistakes}`, `{mistakes: [], message}` or `{error, mistakes: []}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub mistakes: Vec<DetectedMistake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PipelineOutcome {
    fn failed(e: &Error) -> Self {
        Self {
            error: Some(format!("Detection failed: {}", e)),
            ..Default::default()
        }
    }

    fn empty() -> Self {
        Self {
            message: Some(NO_MISTAKES_MESSAGE.to_string()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Subject and tags proposed for a new note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectSuggestion {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// First-pass fields echoed back to the model during reconciliation.
#[derive(Serialize)]
struct FirstPass<'a> {
    ocr_question: &'a str,
    ocr_answer: Option<&'a str>,
    correction_text: Option<&'a str>,
    status: SolveStatus,
    has_diagram: bool,
    confidence: f64,
}

#[derive(Deserialize)]
struct Detection {
    #[serde(default)]
    mistakes: Vec<Value>,
}

fn str_field(m: &Map<String, Value>, key: &str) -> Option<String> {
    m.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(m: &Map<String, Value>, key: &str) -> Option<bool> {
    m.get(key).and_then(Value::as_bool)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("Image task panicked: {}", e)))?
}

/// Runs the three stages against one completion backend.
pub struct VisionPipeline<'a, B: CompletionBackend + ?Sized> {
    backend: &'a B,
    upload_dir: PathBuf,
    model: String,
}

impl<'a, B: CompletionBackend + ?Sized> VisionPipeline<'a, B> {
    /// Upload paths handed to [`VisionPipeline::run`] are relative to `upload_dir`.
    pub fn new(backend: &'a B, upload_dir: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            backend,
            upload_dir: upload_dir.into(),
            model: model.into(),
        }
    }

    fn crop_dir(&self) -> PathBuf {
        self.upload_dir.join(CROPS_SUBDIR)
    }

    /// Detect, crop and reconcile the mistakes on `image_paths`.
    pub async fn run(&self, image_paths: &[String]) -> PipelineOutcome {
        let start = Instant::now();
        let full_paths: Vec<PathBuf> = image_paths
            .iter()
            .map(|p| self.upload_dir.join(p))
            .collect();

        let raw = match self.detect(&full_paths).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(
                    subsystem = "inference",
                    component = "vision_pipeline",
                    op = "detect",
                    model = %self.model,
                    image_count = full_paths.len(),
                    error = %e,
                    "Detection failed"
                );
                return PipelineOutcome::failed(&e);
            }
        };
        if raw.is_empty() {
            return PipelineOutcome::empty();
        }

        if let Err(e) = std::fs::create_dir_all(self.crop_dir()) {
            warn!(
                subsystem = "inference",
                component = "vision_pipeline",
                error = %e,
                "Failed to create crop directory"
            );
        }

        let mut items = Vec::with_capacity(raw.len());
        for (index, mistake) in raw.iter().enumerate() {
            items.push(self.crop(index, mistake, &full_paths).await);
        }
        for item in items.iter_mut() {
            self.reconcile(item).await;
        }

        info!(
            subsystem = "inference",
            component = "vision_pipeline",
            op = "run",
            model = %self.model,
            image_count = full_paths.len(),
            mistake_count = items.len(),
            needs_edit = items.iter().filter(|i| i.needs_user_edit).count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Vision pipeline complete"
        );
        PipelineOutcome {
            mistakes: items,
            ..Default::default()
        }
    }

    /// Stage 1. Returns the raw mistake objects from the model.
    async fn detect(&self, full_paths: &[PathBuf]) -> Result<Vec<Value>> {
        if full_paths.is_empty() {
            return Err(Error::InvalidInput("No images to analyze".to_string()));
        }
        let mut images = Vec::with_capacity(full_paths.len());
        for path in full_paths {
            let path = path.clone();
            images.push(blocking(move || resize_to_base64(&path, VISION_MAX_DIM)).await?);
        }

        let reply = self
            .backend
            .vision_completion(&images, DETECTION_PROMPT, &self.model, CompletionOptions::vision())
            .await?;
        let detection: Detection = parse_json_reply(&reply)?;

        debug!(
            subsystem = "inference",
            component = "vision_pipeline",
            op = "detect",
            mistake_count = detection.mistakes.len(),
            response_len = reply.len(),
            "Detection parsed"
        );
        Ok(detection.mistakes)
    }

    async fn crop_region(&self, source: &Path, bbox: Option<BBox>, index: usize, what: &str) -> Option<String> {
        let bbox = bbox?;
        let source = source.to_path_buf();
        let crop_dir = self.crop_dir();
        match blocking(move || crop_to_file(&source, &bbox, &crop_dir)).await {
            Ok(name) => Some(format!("{}/{}", CROPS_SUBDIR, name)),
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "vision_pipeline",
                    op = "crop",
                    index,
                    region = what,
                    error = %e,
                    "Crop failed"
                );
                None
            }
        }
    }

    /// Stage 2. Build the review item for one raw mistake.
    async fn crop(&self, index: usize, raw: &Value, full_paths: &[PathBuf]) -> DetectedMistake {
        let empty = Map::new();
        let m = raw.as_object().unwrap_or(&empty);

        let image_index = m
            .get("image_index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .filter(|i| *i < full_paths.len())
            .unwrap_or(0);
        let source = &full_paths[image_index];

        let has_correction = bool_field(m, "has_correction").unwrap_or(false);
        let has_diagram = bool_field(m, "has_diagram").unwrap_or(false);
        let bbox_value = m.get("bbox").cloned().unwrap_or_else(|| Value::Object(Map::new()));

        let crop_image_path = self
            .crop_region(source, BBox::from_value(&bbox_value), index, "question")
            .await;
        let correction_image_path = if has_correction {
            let bbox = m.get("correction_bbox").and_then(BBox::from_value);
            self.crop_region(source, bbox, index, "correction").await
        } else {
            None
        };
        let diagram_image_path = if has_diagram {
            let bbox = m.get("diagram_bbox").and_then(BBox::from_value);
            self.crop_region(source, bbox, index, "diagram").await
        } else {
            None
        };

        DetectedMistake {
            index,
            image_index,
            crop_image_path,
            correction_image_path,
            diagram_image_path,
            ocr_question: str_field(m, "ocr_question").unwrap_or_default(),
            ocr_answer: str_field(m, "ocr_answer"),
            correction_text: str_field(m, "correction_text"),
            status: if has_correction {
                SolveStatus::Solved
            } else {
                SolveStatus::Unsolved
            },
            has_diagram,
            bbox_json: bbox_value.to_string(),
            confidence: m
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_CONFIDENCE),
            needs_user_edit: false,
        }
    }

    /// Stage 3. Second look at one crop; failures only flag the item.
    async fn reconcile(&self, item: &mut DetectedMistake) {
        let Some(crop) = item.crop_image_path.clone() else {
            item.needs_user_edit = true;
            return;
        };
        let crop_path = self.upload_dir.join(&crop);
        if !crop_path.is_file() {
            item.needs_user_edit = true;
            return;
        }

        if let Err(e) = self.reconcile_with_model(item, crop_path).await {
            warn!(
                subsystem = "inference",
                component = "vision_pipeline",
                op = "reconcile",
                index = item.index,
                error = %e,
                "Reconciliation failed"
            );
            if item.confidence < NEEDS_EDIT_CONFIDENCE {
                item.needs_user_edit = true;
            }
        }
    }

    async fn reconcile_with_model(&self, item: &mut DetectedMistake, crop_path: PathBuf) -> Result<()> {
        let crop_b64 = blocking(move || resize_to_base64(&crop_path, VISION_MAX_DIM)).await?;
        let first_pass = serde_json::to_string(&FirstPass {
            ocr_question: &item.ocr_question,
            ocr_answer: item.ocr_answer.as_deref(),
            correction_text: item.correction_text.as_deref(),
            status: item.status,
            has_diagram: item.has_diagram,
            confidence: item.confidence,
        })?;

        let reply = self
            .backend
            .vision_completion(
                &[crop_b64],
                &reconciliation_prompt(&first_pass),
                &self.model,
                CompletionOptions::vision(),
            )
            .await?;
        let recon: Map<String, Value> = parse_json_reply(&reply)?;
        merge_reconciliation(item, &recon);
        Ok(())
    }
}

/// Apply every field the reconciliation reply provides.
///
/// `ocr_answer` and `correction_text` may be cleared with an explicit null.
/// `needs_user_edit` falls back to the (updated) confidence threshold.
pub fn merge_reconciliation(item: &mut DetectedMistake, recon: &Map<String, Value>) {
    if let Some(q) = str_field(recon, "ocr_question") {
        item.ocr_question = q;
    }
    for (key, slot) in [
        ("ocr_answer", &mut item.ocr_answer),
        ("correction_text", &mut item.correction_text),
    ] {
        match recon.get(key) {
            Some(Value::Null) => *slot = None,
            Some(Value::String(s)) => *slot = Some(s.clone()),
            _ => {}
        }
    }
    if let Some(status) = recon
        .get("status")
        .and_then(Value::as_str)
        .and_then(|s| SolveStatus::from_str(s).ok())
    {
        item.status = status;
    }
    if let Some(c) = recon.get("confidence").and_then(Value::as_f64) {
        item.confidence = c;
    }
    if let Some(d) = bool_field(recon, "has_diagram") {
        item.has_diagram = d;
    }
    item.needs_user_edit =
        bool_field(recon, "needs_user_edit").unwrap_or(item.confidence < NEEDS_EDIT_CONFIDENCE);
}

/// Ask the chat model for a subject and tags. Any failure yields an empty suggestion.
pub async fn suggest_subject_and_tags<B: CompletionBackend + ?Sized>(
    backend: &B,
    mistakes: &[DetectedMistake],
    model: &str,
) -> SubjectSuggestion {
    let prompt = suggestion_prompt(
        mistakes
            .iter()
            .map(|m| (m.ocr_question.as_str(), m.ocr_answer.as_deref())),
    );
    let reply = backend
        .chat_completion(&[PromptMessage::user(prompt)], model, suggestion_options())
        .await;
    match reply.and_then(|r| parse_json_reply::<SubjectSuggestion>(&r)) {
        Ok(s) => s,
        Err(e) => {
            warn!(
                subsystem = "inference",
                component = "vision_pipeline",
                op = "suggest",
                model,
                error = %e,
                "Subject/tag suggestion failed"
            );
            SubjectSuggestion::default()
        }
    }
}
