//! Prompt rendering
//!
//! The rendered prompt is a pure function of the extracted features, so a
//! stored model's prompt always matches its features.

use huddle_core::{StyleFeatures, SubjectKind};
use std::fmt::Write;

/// Render the system instruction for an agent speaking in the subject's
/// style. Empty features render to an empty prompt.
pub fn render_prompt(kind: SubjectKind, features: &StyleFeatures) -> String {
    if features.is_empty() && features.average_length == 0.0 {
        return String::new();
    }

    let mut out = String::new();
    match kind {
        SubjectKind::User => {
            out.push_str(
                "You are a companion who talks exactly like the person you are chatting with. \
                 Mirror their voice in every reply.\n",
            );
        }
        SubjectKind::Group => {
            out.push_str(
                "You are the collective voice of a group chat. \
                 Reply the way the group talks together.\n",
            );
        }
    }

    let _ = writeln!(
        out,
        "\nTypical message length: about {} characters. {}",
        features.average_length.round() as u64,
        length_hint(features.average_length)
    );

    if !features.phrases.is_empty() {
        let _ = writeln!(
            out,
            "Phrases that come up often: {}.",
            features
                .phrases
                .iter()
                .map(|p| format!("\"{}\"", p))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if !features.symbols.is_empty() {
        let _ = writeln!(
            out,
            "Symbols and emoji in use, most frequent first: {}.",
            features
                .symbols
                .iter()
                .map(|s| format!("{} ({})", s.symbol, s.count))
                .collect::<Vec<_>>()
                .join(" ")
        );
    }

    if !features.tone.is_empty() {
        let _ = writeln!(
            out,
            "Tone: {}.",
            features
                .tone
                .iter()
                .map(|t| format!("{} {:.0}%", t.tone.as_str(), t.percent))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    out.push_str(
        "\nUse these phrases and symbols naturally and only where they fit. \
         Never mention that you are imitating anyone.",
    );
    out
}

fn length_hint(average: f64) -> &'static str {
    if average < 25.0 {
        "Keep replies very short."
    } else if average < 80.0 {
        "Keep replies to a sentence or two."
    } else {
        "Longer, fuller replies are fine."
    }
}
