//! Text plausibility scoring and sanitization.
//!
//! Strategies use these heuristics to decide whether an extraction result
//! is trustworthy or whether to escalate to a more expensive fallback.
//! The OCR engine reports its own confidence; these scores look at the text
//! itself for patterns that indicate garbled recognition.

use serde::Serialize;

/// Assessment of an extraction result's plausibility.
#[derive(Debug, Clone, Serialize)]
pub struct QualityAssessment {
    /// Composite plausibility score in [0, 1].
    pub score: f32,
    /// True when the text looks like OCR noise rather than language.
    pub likely_gibberish: bool,
    /// Blend of engine confidence and text score.
    pub estimated_accuracy: f32,
    pub text_length: usize,
    pub word_count: usize,
}

/// Score extracted text together with the engine-reported confidence.
pub fn assess(text: &str, confidence: f32) -> QualityAssessment {
    let score = score_text(text);
    QualityAssessment {
        score,
        likely_gibberish: !text.is_empty() && score < 0.45,
        estimated_accuracy: (0.6 * confidence + 0.4 * score).clamp(0.0, 1.0),
        text_length: text.chars().count(),
        word_count: text.split_whitespace().count(),
    }
}

/// Composite plausibility score for a piece of extracted text.
///
/// Weighs character mix, word shapes, whitespace density and character
/// repetition. Very short samples cannot be judged and score 0.5.
pub fn score_text(text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    if text.chars().count() < 5 {
        return 0.5;
    }

    let score = 0.40 * char_mix_score(text)
        + 0.30 * word_shape_score(text)
        + 0.15 * whitespace_score(text)
        + 0.15 * repetition_score(text);

    score.clamp(0.0, 1.0)
}

/// Strip control characters and normalize whitespace.
///
/// Carriage returns fold into newlines, runs of spaces and tabs collapse to
/// a single space, and runs of three or more newlines collapse to a blank
/// line. The result is trimmed.
pub fn sanitize_text(raw: &str) -> String {
    let raw = raw.replace("\r\n", "\n");
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    let mut newline_run = 0u32;

    for c in raw.chars() {
        let c = if c == '\r' { '\n' } else { c };
        if c == '\n' {
            newline_run += 1;
            pending_space = false;
            if newline_run <= 2 {
                out.push('\n');
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with('\n') {
            out.push(' ');
        }
        pending_space = false;
        newline_run = 0;
        out.push(c);
    }

    out.trim().to_string()
}

/// Penalize text with too many special characters or too few letters.
fn char_mix_score(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }

    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let special = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !c.is_ascii_punctuation())
        .count();

    let special_ratio = special as f32 / total as f32;
    let special_penalty = 1.0 - (special_ratio * 10.0).min(1.0);

    let letter_ratio = letters as f32 / total as f32;
    let letter_score = (letter_ratio * 1.5).min(1.0);

    special_penalty * 0.6 + letter_score * 0.4
}

/// Garbled OCR tends to produce single-character "words" or very long runs.
fn word_shape_score(text: &str) -> f32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.5;
    }

    let total_len: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_len = total_len as f32 / words.len() as f32;

    let avg_score = match avg_len as usize {
        0..=1 => 0.3,
        2..=3 => 0.7,
        4..=8 => 1.0,
        9..=12 => 0.8,
        _ => 0.4,
    };

    let single_count = words.iter().filter(|w| w.chars().count() == 1).count();
    let single_ratio = single_count as f32 / words.len() as f32;
    let single_penalty = 1.0 - (single_ratio * 1.5).min(0.5);

    avg_score * single_penalty
}

/// Normal prose carries roughly 10-25% whitespace.
fn whitespace_score(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }

    let whitespace = text.chars().filter(|c| c.is_whitespace()).count();
    let percent = (whitespace as f32 / total as f32) * 100.0;

    match percent as usize {
        0..=5 => 0.5,
        6..=10 => 0.8,
        11..=25 => 1.0,
        26..=40 => 0.7,
        _ => 0.3,
    }
}

/// Long repeated character runs ("aaaa", "####") indicate engine confusion.
fn repetition_score(text: &str) -> f32 {
    let mut max_run = 1;
    let mut run = 1;
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if Some(c) == prev && !c.is_whitespace() {
            run += 1;
            max_run = max_run.max(run);
        } else {
            run = 1;
        }
        prev = Some(c);
    }

    match max_run {
        1..=3 => 1.0,
        4..=5 => 0.8,
        6..=10 => 0.5,
        _ => 0.2,
    }
}
