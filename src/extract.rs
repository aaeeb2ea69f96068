//! The content-extraction collaborator boundary.
//!
//! The pipeline only knows `extract(kind, payload) -> text`: an empty
//! result is a soft failure, an error a hard one. The bundled
//! [`PhraseExtractor`] does text cleanup plus a capitalized-phrase pass so
//! the pipeline runs end to end without any model behind it.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;

use crate::{TaskKind, RESULT_SEPARATOR};

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracted facts joined with [`RESULT_SEPARATOR`]. Empty output means
    /// nothing usable was found.
    async fn extract(&self, kind: TaskKind, payload: &str) -> Result<String>;
}

/// One extraction routine per task kind.
///
/// A field per [`TaskKind`] variant: registering a new kind is a new field
/// plus a new match arm, enforced at compile time rather than by string
/// comparison at dispatch.
pub struct ExtractorRegistry {
    job_ad: Arc<dyn Extractor>,
    resume: Arc<dyn Extractor>,
}

impl ExtractorRegistry {
    pub fn new(job_ad: Arc<dyn Extractor>, resume: Arc<dyn Extractor>) -> Self {
        ExtractorRegistry { job_ad, resume }
    }

    /// Register the same routine for every kind.
    pub fn uniform(extractor: Arc<dyn Extractor>) -> Self {
        ExtractorRegistry {
            job_ad: extractor.clone(),
            resume: extractor,
        }
    }

    pub fn get(&self, kind: TaskKind) -> &dyn Extractor {
        match kind {
            TaskKind::JobAdUpload => &*self.job_ad,
            TaskKind::ResumeUpload => &*self.resume,
        }
    }
}

/// Reference extractor: cleanup plus salient-phrase extraction.
///
/// Job-ad payloads are the text itself; resume payloads are a filesystem
/// path whose contents are read first. Facts are runs of two or more
/// capitalized words, deduplicated in order of appearance.
pub struct PhraseExtractor {
    sentence_breaks: Regex,
    specials: Regex,
    filler_runs: Regex,
}

impl PhraseExtractor {
    pub fn new() -> Self {
        PhraseExtractor {
            sentence_breaks: Regex::new(r"\.\s+|\n+").unwrap(),
            specials: Regex::new(r"[^\w\s.,:;!$@]").unwrap(),
            filler_runs: Regex::new(r"(\W|^)[_.]{2,}").unwrap(),
        }
    }

    /// Re-terminate sentences with periods and strip characters that carry
    /// no signal: symbols outside a small kept set, and leader runs of dots
    /// or underscores that start a word boundary.
    pub fn clean_text(&self, text: &str) -> String {
        let mut formatted = String::with_capacity(text.len());
        for sentence in self.sentence_breaks.split(text) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            formatted.push_str(sentence);
            if !sentence.ends_with('.') {
                formatted.push('.');
            }
            formatted.push(' ');
        }

        let stripped = self.specials.replace_all(&formatted, "");
        self.filler_runs.replace_all(&stripped, "$1").into_owned()
    }

    /// Runs of two or more capitalized words, first occurrence wins.
    pub fn salient_phrases(&self, text: &str) -> Vec<String> {
        let mut phrases = Vec::new();
        let mut seen = HashSet::new();
        let mut run: Vec<&str> = Vec::new();

        let mut flush = |run: &mut Vec<&str>| {
            if run.len() >= 2 {
                let phrase = run.join(" ");
                if seen.insert(phrase.clone()) {
                    phrases.push(phrase);
                }
            }
            run.clear();
        };

        for token in text.split_whitespace() {
            let word = token.trim_matches(|c: char| !c.is_alphanumeric());
            let capitalized = word.chars().next().is_some_and(char::is_uppercase);
            if capitalized {
                run.push(word);
            } else {
                flush(&mut run);
            }
        }
        flush(&mut run);

        phrases
    }
}

impl Default for PhraseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PhraseExtractor {
    async fn extract(&self, kind: TaskKind, payload: &str) -> Result<String> {
        let text = match kind {
            TaskKind::JobAdUpload => payload.to_string(),
            TaskKind::ResumeUpload => tokio::fs::read_to_string(payload)
                .await
                .with_context(|| format!("reading resume file {payload}"))?,
        };

        let cleaned = self.clean_text(&text);
        let phrases = self.salient_phrases(&cleaned);

        Ok(phrases.join(RESULT_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn clean_reterminates_sentences() {
        let extractor = PhraseExtractor::new();
        let cleaned = extractor.clean_text("first line\nsecond line. third");
        assert_eq!(cleaned, "first line. second line. third. ");
    }

    #[test]
    fn clean_strips_special_characters() {
        let extractor = PhraseExtractor::new();
        let cleaned = extractor.clean_text("Rust & C (remote) #hiring");
        assert!(!cleaned.contains('&'));
        assert!(!cleaned.contains('('));
        assert!(!cleaned.contains('#'));
        assert!(cleaned.contains("Rust"));
    }

    #[test]
    fn clean_drops_leading_filler_runs() {
        let extractor = PhraseExtractor::new();
        let cleaned = extractor.clean_text("..... intro text");
        assert!(!cleaned.contains(".."));
        assert!(cleaned.contains("intro text"));
    }

    #[test]
    fn phrases_capture_capitalized_runs() {
        let extractor = PhraseExtractor::new();
        let phrases =
            extractor.salient_phrases("Senior Go engineer needed at Acme Corp in New York. ");
        assert_eq!(phrases, vec!["Senior Go", "Acme Corp", "New York"]);
    }

    #[test]
    fn phrases_are_deduplicated_in_order() {
        let extractor = PhraseExtractor::new();
        let phrases = extractor.salient_phrases("Acme Corp hired. Acme Corp again. ");
        assert_eq!(phrases, vec!["Acme Corp"]);
    }

    #[tokio::test]
    async fn job_ad_extraction_yields_joined_phrases() {
        let extractor = PhraseExtractor::new();
        let result = extractor
            .extract(
                TaskKind::JobAdUpload,
                "Senior Go engineer needed at Acme Corp.",
            )
            .await
            .unwrap();
        assert!(result.contains("Acme Corp"));
        assert!(result.contains(RESULT_SEPARATOR));
    }

    #[tokio::test]
    async fn job_ad_without_entities_is_empty() {
        let extractor = PhraseExtractor::new();
        let result = extractor
            .extract(TaskKind::JobAdUpload, "looking for someone to write code")
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn resume_extraction_reads_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Jane Doe\nworked at Globex Industries since 2019").unwrap();

        let extractor = PhraseExtractor::new();
        let result = extractor
            .extract(TaskKind::ResumeUpload, file.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(result.contains("Jane Doe"));
        assert!(result.contains("Globex Industries"));
    }

    #[tokio::test]
    async fn missing_resume_file_is_an_error() {
        let extractor = PhraseExtractor::new();
        let err = extractor
            .extract(TaskKind::ResumeUpload, "/nonexistent/resume.txt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("resume"));
    }
}
