//! Grammar analyzer state: when to check, and which results still count.

use crate::config::AssistConfig;
use crate::finding::Finding;

/// A grammar request to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarTicket {
    pub seq: u64,
    /// Document version the text was taken from.
    pub version: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarDecision {
    /// Nothing meaningful changed since the last check.
    Skip,
    /// Too short to check; existing findings should go.
    Clear,
    Check(GrammarTicket),
}

#[derive(Debug, Default)]
pub struct GrammarAnalyzer {
    last_checked: String,
    seq: u64,
    findings: Vec<Finding>,
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl GrammarAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what to do with the current text once the debounce expires.
    pub fn decide(&mut self, text: &str, version: u64, config: &AssistConfig) -> GrammarDecision {
        let len = text.chars().count();
        let last_len = self.last_checked.chars().count();
        let forced = len.abs_diff(last_len) > config.grammar_length_threshold;

        if !forced && normalize(text) == normalize(&self.last_checked) {
            log::trace!("grammar: text unchanged, skipping");
            return GrammarDecision::Skip;
        }

        if len < config.grammar_min_chars {
            log::trace!("grammar: text too short ({} chars)", len);
            self.findings.clear();
            // Retyping the last checked text must check it again.
            self.last_checked.clear();
            return GrammarDecision::Clear;
        }

        self.last_checked = text.to_string();
        self.seq += 1;
        GrammarDecision::Check(GrammarTicket {
            seq: self.seq,
            version,
            text: text.to_string(),
        })
    }

    /// Accept a result if it answers the latest request and the document has
    /// not changed since. Returns the findings to lay over the document.
    pub fn accept(
        &mut self,
        seq: u64,
        version: u64,
        current_version: u64,
        findings: Vec<Finding>,
    ) -> Option<&[Finding]> {
        if seq != self.seq {
            log::debug!("grammar: dropping result {} (latest is {})", seq, self.seq);
            return None;
        }
        if version != current_version {
            log::debug!(
                "grammar: dropping result for version {} (document at {})",
                version,
                current_version
            );
            // Let the next pass re-check this text.
            self.last_checked.clear();
            return None;
        }
        self.findings = findings;
        Some(&self.findings)
    }

    /// Forget findings whose positions no longer mean anything. Their marks
    /// are gone too, so the next pass checks even unchanged text.
    pub fn invalidate(&mut self) {
        self.findings.clear();
        self.last_checked.clear();
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
