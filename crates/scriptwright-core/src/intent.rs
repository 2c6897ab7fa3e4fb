//! Decide whether an utterance asks for a file suggestion or is plain conversation.
//!
//! Classification is a table of cue families checked in priority order. A
//! file-suggestion intent needs both a `<identifier>.<extension>` token and a
//! matching cue; everything else is conversation.

use crate::project::SCRIPT_EXTENSION;
use crate::state::SuggestionKind;
use regex::{Regex, RegexBuilder};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Suggest { kind: SuggestionKind, target_name: String },
    Converse,
}

/// Keywords that, together with a target file, select a suggestion kind
#[derive(Debug, Clone)]
pub struct CueFamily {
    pub kind: SuggestionKind,
    pattern: Regex,
}

impl CueFamily {
    pub fn new(kind: SuggestionKind, words: &[&str]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
        let pattern = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;
        Ok(Self { kind, pattern })
    }

    pub fn matches(&self, utterance: &str) -> bool {
        self.pattern.is_match(utterance)
    }
}

pub const CREATE_CUES: &[&str] = &["create", "make", "generate"];
pub const EDIT_CUES: &[&str] = &[
    "edit", "update", "change", "modify", "optimize", "rewrite", "add", "remove",
];

#[derive(Debug, Clone)]
pub struct IntentClassifier {
    /// `None` disables suggestions entirely
    target: Option<Regex>,
    /// Checked in order; the first family that matches decides the kind
    families: Vec<CueFamily>,
}

impl IntentClassifier {
    /// The target token must end at a word boundary, so `Player.csv` and
    /// `Player.cs_old` name no script.
    pub fn new(extension: &str, families: Vec<CueFamily>) -> Result<Self, regex::Error> {
        let target = Regex::new(&format!(r"[A-Za-z0-9_]+\.{}\b", regex::escape(extension)))?;
        Ok(Self {
            target: Some(target),
            families,
        })
    }

    /// Create and edit cues over script files
    pub fn standard() -> Result<Self, regex::Error> {
        let families = vec![
            CueFamily::new(SuggestionKind::Create, CREATE_CUES)?,
            CueFamily::new(SuggestionKind::Edit, EDIT_CUES)?,
        ];
        Self::new(SCRIPT_EXTENSION, families)
    }

    /// Classifies everything as conversation
    pub fn conversation_only() -> Self {
        Self {
            target: None,
            families: Vec::new(),
        }
    }

    /// First `<identifier>.<extension>` token in the utterance
    pub fn target_name<'a>(&self, utterance: &'a str) -> Option<&'a str> {
        self.target.as_ref()?.find(utterance).map(|m| m.as_str())
    }

    pub fn classify(&self, utterance: &str) -> Intent {
        let Some(target_name) = self.target_name(utterance) else {
            return Intent::Converse;
        };

        self.families
            .iter()
            .find(|family| family.matches(utterance))
            .map_or(Intent::Converse, |family| Intent::Suggest {
                kind: family.kind,
                target_name: target_name.to_string(),
            })
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::standard().unwrap_or_else(|e| {
            warn!(error = %e, "intent table failed to compile; file suggestions disabled");
            Self::conversation_only()
        })
    }
}
