//! Feature extraction

use huddle_core::{StyleFeatures, SymbolCount, Tone, ToneShare};
use std::collections::HashMap;

/// Phrases too common to say anything about a speaker.
const PHRASE_STOPLIST: &[&str] = &[
    "i am", "i'm not", "it is", "it's a", "is a", "is the", "in the", "of the", "to the",
    "on the", "at the", "for the", "and the", "with the", "from the", "to be", "i have",
    "i don't", "do you", "are you", "this is", "that is", "there is", "going to", "want to",
    "have to", "i think", "you are", "it was", "i was", "if you", "can you", "a lot",
    "a lot of", "one of the", "i want to", "i don't know", "do you want",
];

/// Characters that only modify the glyph before them.
const JOINERS: &[char] = &['\u{200D}', '\u{FE0E}', '\u{FE0F}'];

const POSITIVE: &[&str] = &[
    "love", "great", "awesome", "amazing", "thanks", "thank", "nice", "good", "happy", "glad",
    "cool", "perfect", "yay", "beautiful", "fun",
];
const NEGATIVE: &[&str] = &[
    "hate", "bad", "sad", "terrible", "awful", "annoying", "angry", "ugh", "worst", "tired",
    "boring", "upset", "hurt",
];
const CASUAL: &[&str] = &[
    "lol", "lmao", "haha", "hahaha", "hehe", "omg", "gonna", "wanna", "gotta", "yeah", "yep",
    "nah", "btw", "idk", "tbh", "u", "ur", "ya", "dude",
];
const FORMAL: &[&str] = &[
    "please", "regards", "however", "therefore", "kindly", "furthermore", "sincerely",
    "appreciate", "regarding", "moreover", "certainly",
];

/// Caps applied to the extracted lists.
#[derive(Clone, Copy, Debug)]
pub struct FeatureLimits {
    pub max_phrases: usize,
    pub max_symbols: usize,
}

impl Default for FeatureLimits {
    fn default() -> Self {
        Self {
            max_phrases: 15,
            max_symbols: 20,
        }
    }
}

/// Extract style features from message contents.
pub fn extract_features<S: AsRef<str>>(contents: &[S], limits: FeatureLimits) -> StyleFeatures {
    StyleFeatures {
        phrases: common_phrases(contents, limits.max_phrases),
        symbols: symbol_histogram(contents, limits.max_symbols),
        average_length: average_length(contents),
        tone: tone_distribution(contents),
    }
}

fn words(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// 2- and 3-word phrases appearing at least twice, most frequent first.
pub(crate) fn common_phrases<S: AsRef<str>>(contents: &[S], max: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for content in contents {
        let words = words(content.as_ref());
        for n in 2..=3 {
            for window in words.windows(n) {
                *counts.entry(window.join(" ")).or_default() += 1;
            }
        }
    }

    let mut phrases: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(phrase, count)| *count >= 2 && !PHRASE_STOPLIST.contains(&phrase.as_str()))
        .collect();
    phrases.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    phrases.into_iter().take(max).map(|(p, _)| p).collect()
}

/// Counts of every non-alphanumeric, non-space character, most used first.
pub(crate) fn symbol_histogram<S: AsRef<str>>(contents: &[S], max: usize) -> Vec<SymbolCount> {
    let mut counts: HashMap<char, usize> = HashMap::new();
    for content in contents {
        for c in content.as_ref().chars() {
            if c.is_alphanumeric() || c.is_whitespace() || JOINERS.contains(&c) {
                continue;
            }
            *counts.entry(c).or_default() += 1;
        }
    }

    let mut symbols: Vec<(char, usize)> = counts.into_iter().collect();
    symbols.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    symbols
        .into_iter()
        .take(max)
        .map(|(c, count)| SymbolCount {
            symbol: c.to_string(),
            count,
        })
        .collect()
}

/// Mean length in characters.
pub(crate) fn average_length<S: AsRef<str>>(contents: &[S]) -> f64 {
    if contents.is_empty() {
        return 0.0;
    }
    let total: usize = contents.iter().map(|c| c.as_ref().chars().count()).sum();
    total as f64 / contents.len() as f64
}

/// Keyword and punctuation hits per tone, as percentages of all hits.
pub(crate) fn tone_distribution<S: AsRef<str>>(contents: &[S]) -> Vec<ToneShare> {
    let mut counts: HashMap<Tone, usize> = HashMap::new();
    for content in contents {
        let content = content.as_ref();
        *counts.entry(Tone::Enthusiastic).or_default() += content.matches('!').count();
        *counts.entry(Tone::Inquisitive).or_default() += content.matches('?').count();
        for word in words(content) {
            let word = word.as_str();
            let tone = if POSITIVE.contains(&word) {
                Tone::Positive
            } else if NEGATIVE.contains(&word) {
                Tone::Negative
            } else if CASUAL.contains(&word) {
                Tone::Casual
            } else if FORMAL.contains(&word) {
                Tone::Formal
            } else {
                continue;
            };
            *counts.entry(tone).or_default() += 1;
        }
    }

    let total: usize = counts.values().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut shares: Vec<ToneShare> = Tone::ALL
        .iter()
        .filter_map(|tone| {
            let count = counts.get(tone).copied().unwrap_or(0);
            (count > 0).then(|| ToneShare {
                tone: *tone,
                percent: (count as f64 * 1000.0 / total as f64).round() / 10.0,
            })
        })
        .collect();
    // Stable sort keeps Tone::ALL order among equal shares.
    shares.sort_by(|a, b| b.percent.total_cmp(&a.percent));
    shares
}
