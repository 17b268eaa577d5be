// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Dotted-topic pattern matching (`spec.md` §4.6, §9 "Global event bus":
//! "preserve the dotted-topic matching semantics").
//!
//! A pattern segment of `*` matches exactly one dot-delimited topic
//! segment; any other segment must match literally. `job.*` matches
//! `job.task_completed` but not `job.task.completed` or plain `job`.

#[derive(Debug, Clone)]
pub struct Pattern(Vec<String>);

impl Pattern {
    pub fn new(pattern: &str) -> Self {
        Self(pattern.split('.').map(str::to_string).collect())
    }

    pub fn matches(&self, topic: &str) -> bool {
        let segments: Vec<&str> = topic.split('.').collect();
        if segments.len() != self.0.len() {
            return false;
        }
        self.0.iter().zip(segments.iter()).all(|(pat, seg)| pat == "*" || pat == seg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_exactly_one_segment() {
        let p = Pattern::new("job.*");
        assert!(p.matches("job.task_completed"));
        assert!(!p.matches("job.task.completed"));
        assert!(!p.matches("job"));
    }

    #[test]
    fn literal_pattern_requires_exact_match() {
        let p = Pattern::new("terminal.stdout");
        assert!(p.matches("terminal.stdout"));
        assert!(!p.matches("terminal.stderr"));
    }

    #[test]
    fn wildcard_in_any_position_matches_that_segment() {
        let p = Pattern::new("*.stdout");
        assert!(p.matches("terminal.stdout"));
        assert!(!p.matches("terminal.stderr"));
    }
}
