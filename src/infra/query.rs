//! Fetch-description transforms.

use tracing::debug;

use crate::core::DescriptionTransform;

/// Bounds unbounded `SELECT` statements by appending `LIMIT n`.
///
/// Statements that already carry a `LIMIT` clause, or that are not reads,
/// pass through unchanged. A trailing semicolon is kept at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLimitGuard {
    limit: u32,
}

impl RowLimitGuard {
    /// Guard that injects `LIMIT limit`.
    #[must_use]
    pub const fn new(limit: u32) -> Self {
        Self { limit }
    }

    /// Injected limit.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    fn is_unbounded_select(statement: &str) -> bool {
        let upper = statement.to_ascii_uppercase();
        let is_read = upper.starts_with("SELECT") || upper.starts_with("WITH");
        is_read && !Self::has_outer_limit(statement)
    }

    /// True when a `LIMIT` keyword appears outside every parenthesised
    /// subquery and string literal.
    fn has_outer_limit(statement: &str) -> bool {
        let mut depth = 0_usize;
        let mut in_literal = false;
        let mut word = String::new();
        for ch in statement.chars().chain(std::iter::once(' ')) {
            if in_literal {
                if ch == '\'' {
                    in_literal = false;
                }
                continue;
            }
            if ch.is_ascii_alphanumeric() || ch == '_' {
                word.push(ch);
                continue;
            }
            if depth == 0 && word.eq_ignore_ascii_case("LIMIT") {
                return true;
            }
            word.clear();
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                '\'' => in_literal = true,
                _ => {}
            }
        }
        false
    }
}

impl DescriptionTransform for RowLimitGuard {
    fn transform(&self, description: &str) -> String {
        let trimmed = description.trim();
        let (statement, terminator) = match trimmed.strip_suffix(';') {
            Some(body) => (body.trim_end(), ";"),
            None => (trimmed, ""),
        };
        if !Self::is_unbounded_select(statement) {
            return description.to_owned();
        }
        debug!(limit = self.limit, "bounding unbounded query");
        format!("{statement} LIMIT {}{terminator}", self.limit)
    }
}
