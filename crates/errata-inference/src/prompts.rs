//! Prompt templates sent to OpenRouter.

use serde::Serialize;

use errata_core::CompletionOptions;

/// First pass: find every teacher's wrong mark across all uploaded pages.
pub const DETECTION_PROMPT: &str = r#"You are analyzing teacher-corrected homework/exam paper images from a Chinese student.

TASK: Detect all WRONG marks (叉, ×, X, or similar marks teachers use to indicate mistakes) in the image(s).

For each detected wrong mark, provide:
1. The bounding box of the question/answer region near the wrong mark (as fractions 0-1 of image dimensions)
2. The OCR text of the student's original question
3. The OCR text of the student's answer (if visible)
4. Whether a teacher's correction/correct answer exists nearby
5. If correction exists, the OCR text of the correction
6. Whether there is a diagram/geometry figure in the region
7. Your confidence score (0-1) for this detection

RESPOND WITH VALID JSON ONLY (no markdown fences). Use this exact schema:
{
  "mistakes": [
    {
      "image_index": 0,
      "bbox": {"x": 0.1, "y": 0.2, "w": 0.5, "h": 0.15},
      "ocr_question": "...",
      "ocr_answer": "...",
      "has_correction": true,
      "correction_text": "...",
      "correction_bbox": {"x": ..., "y": ..., "w": ..., "h": ...},
      "has_diagram": false,
      "diagram_bbox": null,
      "confidence": 0.85
    }
  ]
}

If no mistakes are found, return: {"mistakes": []}
"#;

const RECONCILIATION_TEMPLATE: &str = r#"You are performing a second-pass quality check on OCR results extracted from a teacher-corrected homework paper.

Below is the data extracted from the first pass. The crop image is also provided.

First-pass data:
{first_pass_json}

TASK:
1. Re-examine the crop image carefully.
2. Correct any OCR errors in question text, answer text, or correction text.
3. Verify the status: if a correction exists, status should be SOLVED; otherwise UNSOLVED.
4. Update the confidence score based on your re-examination.
5. If confidence is below 0.6, set needs_user_edit to true.

RESPOND WITH VALID JSON ONLY (no markdown fences):
{
  "ocr_question": "refined text...",
  "ocr_answer": "refined text or null",
  "correction_text": "refined text or null",
  "status": "SOLVED or UNSOLVED",
  "has_diagram": true/false,
  "confidence": 0.9,
  "needs_user_edit": false
}
"#;

/// Second pass over one crop, embedding the first-pass JSON.
pub fn reconciliation_prompt(first_pass_json: &str) -> String {
    RECONCILIATION_TEMPLATE.replace("{first_pass_json}", first_pass_json)
}

/// Ask for a subject and 3-5 tags. `mistakes` are `(question, answer)` pairs.
pub fn suggestion_prompt<'a>(mistakes: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> String {
    let context = mistakes
        .into_iter()
        .map(|(q, a)| {
            let q = if q.is_empty() { "N/A" } else { q };
            format!("Question: {}, Answer: {}", q, a.unwrap_or("N/A"))
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Based on these homework/exam mistake items from a Chinese student, suggest:
1. A subject name (e.g., 数学, 英语, 物理, 化学, 语文, etc.)
2. 3-5 relevant tags (e.g., 二次方程, 几何, 阅读理解, etc.)

Mistake items:
{context}

RESPOND WITH VALID JSON ONLY:
{{"subject": "...", "tags": ["tag1", "tag2", "tag3"]}}
"#
    )
}

/// Sampling for subject/tag suggestions.
pub fn suggestion_options() -> CompletionOptions {
    CompletionOptions::new(0.3, 500)
}

/// One past mistake given to the quiz generator.
#[derive(Debug, Clone, Serialize)]
pub struct QuizSource {
    pub question: String,
    pub answer: Option<String>,
    pub subject: String,
}

/// Ask for `count` new practice questions modelled on `sources`.
pub fn quiz_generation_prompt(count: usize, sources: &[QuizSource]) -> String {
    let context = serde_json::to_string(sources).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"Based on these homework mistakes from a Chinese student, generate {count} NEW practice questions that test similar concepts. Make the questions different but related.

Original mistakes:
{context}

RESPOND WITH VALID JSON ONLY:
{{
  "questions": [
    {{"question": "...", "reference_answer": "...", "source_index": 0}}
  ]
}}
"#
    )
}

/// Sampling for quiz generation.
pub fn quiz_generation_options() -> CompletionOptions {
    CompletionOptions::new(0.7, 4096)
}

/// Ask the model to grade one answer.
pub fn judge_prompt(question: &str, reference_answer: Option<&str>, student_answer: &str) -> String {
    let reference = reference_answer
        .filter(|r| !r.is_empty())
        .unwrap_or("Not available");
    format!(
        r#"Judge whether the student's answer is correct.

Question: {question}
Reference answer: {reference}
Student answer: {student_answer}

RESPOND WITH VALID JSON ONLY:
{{"is_correct": true/false, "explanation": "..."}}
"#
    )
}

/// Low temperature so grading is stable.
pub fn judge_options() -> CompletionOptions {
    CompletionOptions::new(0.1, 500)
}

/// System prompt for chat threads, before any retrieved context.
pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful study assistant for a Chinese student. Help them understand their homework/exam mistakes and improve. Respond in the same language as the user's message.";

/// The chat system prompt, with retrieved note context appended when present.
pub fn chat_system_prompt(context: Option<&str>) -> String {
    match context {
        Some(ctx) => format!("{}\n\n{}", CHAT_SYSTEM_PROMPT, ctx),
        None => CHAT_SYSTEM_PROMPT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliation_prompt_embeds_json_once() {
        let p = reconciliation_prompt(r#"{"ocr_question":"1+1=?"}"#);
        assert!(p.contains("First-pass data:\n{\"ocr_question\":\"1+1=?\"}\n"));
        assert!(!p.contains("{first_pass_json}"));
        assert!(p.contains("\"needs_user_edit\": false"));
    }

    #[test]
    fn test_suggestion_prompt_lists_items() {
        let p = suggestion_prompt(vec![("x^2=4", Some("x=2")), ("", None)]);
        assert!(p.contains("Question: x^2=4, Answer: x=2\nQuestion: N/A, Answer: N/A"));
        assert!(p.contains(r#"{"subject": "...", "tags": ["tag1", "tag2", "tag3"]}"#));
    }

    #[test]
    fn test_quiz_prompt_serializes_sources() {
        let p = quiz_generation_prompt(
            2,
            &[QuizSource {
                question: "三角形内角和".to_string(),
                answer: None,
                subject: "Unknown".to_string(),
            }],
        );
        assert!(p.contains("generate 2 NEW practice questions"));
        assert!(p.contains(r#"[{"question":"三角形内角和","answer":null,"subject":"Unknown"}]"#));
    }

    #[test]
    fn test_judge_prompt_without_reference() {
        let p = judge_prompt("2+2?", None, "4");
        assert!(p.contains("Reference answer: Not available\nStudent answer: 4"));
    }

    #[test]
    fn test_chat_system_prompt_with_context() {
        assert_eq!(chat_system_prompt(None), CHAT_SYSTEM_PROMPT);
        let with = chat_system_prompt(Some("Relevant study notes for context:\n[Note #1] x"));
        assert!(with.ends_with(".\n\nRelevant study notes for context:\n[Note #1] x"));
    }

    #[test]
    fn test_option_presets() {
        assert_eq!(suggestion_options().max_tokens, 500);
        assert_eq!(quiz_generation_options().max_tokens, 4096);
        assert!(judge_options().temperature < suggestion_options().temperature);
    }
}
