//! Splits streamed text around inline artifact placeholders.

use crate::config::DEFAULT_PLACEHOLDER_TOKEN;
use crate::types::{ClientArtifact, HostEvent};

/// Incremental placeholder scanner.
///
/// Text that might still turn into a placeholder (a token awaiting an
/// artifact, or a trailing partial token) stays buffered across calls.
#[derive(Debug, Clone)]
pub struct StreamParser {
    tokens: Vec<String>,
    buffer: String,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new(vec![DEFAULT_PLACEHOLDER_TOKEN.to_string()])
    }
}

impl StreamParser {
    pub fn new(tokens: Vec<String>) -> Self {
        let tokens = tokens.into_iter().filter(|t| !t.is_empty()).collect();
        Self {
            tokens,
            buffer: String::new(),
        }
    }

    /// Parse a chunk, pulling one artifact per placeholder from `next_artifact`.
    pub fn parse<F>(&mut self, text: &str, mut next_artifact: F) -> Vec<HostEvent>
    where
        F: FnMut() -> Option<ClientArtifact>,
    {
        let mut events = Vec::new();
        if text.is_empty() && self.buffer.is_empty() {
            return events;
        }

        let mut combined = std::mem::take(&mut self.buffer);
        combined.push_str(text);
        let mut idx = 0;

        while let Some((found, token_len)) = self.next_token(&combined, idx) {
            if found > idx {
                events.push(HostEvent::text(&combined[idx..found]));
            }
            match next_artifact() {
                Some(artifact) => {
                    events.push(HostEvent::Artifact(artifact));
                    idx = found + token_len;
                }
                None => {
                    idx = found;
                    break;
                }
            }
        }

        let remaining = &combined[idx..];
        if remaining.is_empty() {
            return events;
        }
        if self.starts_with_token(remaining) {
            self.buffer = remaining.to_string();
            return events;
        }

        let suffix_len = self.partial_suffix_len(remaining);
        let emit_len = remaining.len() - suffix_len;
        if emit_len > 0 {
            events.push(HostEvent::text(&remaining[..emit_len]));
        }
        if suffix_len > 0 {
            self.buffer = remaining[emit_len..].to_string();
        }
        events
    }

    /// Emit whatever is buffered, placeholder or not.
    pub fn flush(&mut self) -> Vec<HostEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        vec![HostEvent::text(std::mem::take(&mut self.buffer))]
    }

    /// True when a whole token is buffered waiting for an artifact.
    pub fn has_pending_placeholder(&self) -> bool {
        self.tokens.iter().any(|token| self.buffer.contains(token.as_str()))
    }

    fn next_token(&self, text: &str, from: usize) -> Option<(usize, usize)> {
        self.tokens
            .iter()
            .filter_map(|token| text[from..].find(token.as_str()).map(|pos| (from + pos, token.len())))
            .min_by_key(|(pos, _)| *pos)
    }

    fn starts_with_token(&self, text: &str) -> bool {
        self.tokens.iter().any(|token| text.starts_with(token.as_str()))
    }

    /// Length in bytes of the longest tail of `text` that is a proper token prefix.
    fn partial_suffix_len(&self, text: &str) -> usize {
        let mut longest = 0;
        for token in &self.tokens {
            let max_len = text.len().min(token.len().saturating_sub(1));
            for len in (1..=max_len).rev() {
                let start = text.len() - len;
                if !text.is_char_boundary(start) {
                    continue;
                }
                if token.starts_with(&text[start..]) {
                    longest = longest.max(len);
                    break;
                }
            }
        }
        longest
    }
}
