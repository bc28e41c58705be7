//! Splitting a note into retrievable text chunks.

use errata_core::defaults::MIN_PARAGRAPH_CHARS;
use errata_core::Note;

/// Text chunks for a note, in indexing order.
///
/// - paragraphs of the body (split on blank lines) longer than
///   [`MIN_PARAGRAPH_CHARS`] characters
/// - `Question: …` / `Answer: …` for each mistake item with text
/// - one meta chunk of title, subject and tags
pub fn note_chunks(note: &Note) -> Vec<String> {
    let mut chunks: Vec<String> = note
        .content_md
        .trim()
        .split("\n\n")
        .map(str::trim)
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .map(str::to_string)
        .collect();

    for item in &note.mistake_items {
        if !item.ocr_question.is_empty() {
            chunks.push(format!("Question: {}", item.ocr_question));
        }
        if let Some(answer) = item.ocr_answer.as_deref().filter(|a| !a.is_empty()) {
            chunks.push(format!("Answer: {}", answer));
        }
    }

    let mut meta = vec![note.title.as_str()];
    if let Some(subject) = note.subject.as_deref() {
        meta.push(subject);
    }
    meta.extend(note.tags.iter().map(String::as_str));
    let meta = meta.join(" ");
    if !meta.trim().is_empty() {
        chunks.push(meta);
    }

    chunks
}
