//! Wake, deactivation and vision phrase sets
//!
//! Matching is a case-insensitive substring test, so the lists include
//! common misrecognitions of the wake word alongside true synonyms.

use serde::Deserialize;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PhraseSet {
    pub wake: Vec<String>,
    pub deactivate: Vec<String>,
    /// Keywords that route an utterance to the vision query
    pub vision: Vec<String>,
}

impl Default for PhraseSet {
    fn default() -> Self {
        Self {
            wake: strings(&[
                "stacy",
                "stacey",
                "tracy",
                "spacey",
                "hey stacy",
                "hey stacey",
                "ok stacy",
                "okay stacy",
                "htc",
                "h-t-c",
                "h t c",
            ]),
            deactivate: strings(&["exit", "deactivate", "stop listening", "voice off"]),
            vision: strings(&[
                "see", "look", "view", "identify", "what is", "describe", "show me", "보여", "보이",
            ]),
        }
    }
}

fn normalize_list(list: Vec<String>) -> Vec<String> {
    list.into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn contains_any(text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| text.contains(p.as_str()))
}

impl PhraseSet {
    /// Lower-case every phrase, drop blanks, and order wake phrases
    /// longest first so stripping removes "hey stacy" before "stacy"
    pub fn normalized(self) -> Self {
        let mut wake = normalize_list(self.wake);
        wake.sort_by_key(|p| std::cmp::Reverse(p.len()));
        Self {
            wake,
            deactivate: normalize_list(self.deactivate),
            vision: normalize_list(self.vision),
        }
    }

    pub fn is_wake(&self, text: &str) -> bool {
        contains_any(text, &self.wake)
    }

    pub fn is_deactivate(&self, text: &str) -> bool {
        contains_any(text, &self.deactivate)
    }

    pub fn is_vision(&self, text: &str) -> bool {
        contains_any(text, &self.vision)
    }

    /// The utterance with every wake phrase removed and whitespace collapsed
    pub fn strip_wake(&self, text: &str) -> String {
        let mut rest = text.to_string();
        for phrase in &self.wake {
            rest = rest.replace(phrase.as_str(), " ");
        }
        rest.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Lower-case and trim a recognizer transcript
pub fn normalize_transcript(raw: &str) -> String {
    raw.trim().to_lowercase()
}
