//! Turning a review response into a list of comments.

use std::fmt::Display;

/// Comment returned when the service produced no review text.
pub const NO_RESPONSE_COMMENT: &str = "Code review failed: No response from AI";

/// Split review text into trimmed, non-empty lines, in order.
pub fn split_comments(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the comment list for a review. Never empty.
pub fn comments_or_notice(text: &str) -> Vec<String> {
    let comments = split_comments(text);
    if comments.is_empty() {
        return vec![NO_RESPONSE_COMMENT.to_string()];
    }
    comments
}

/// Single comment describing why the review could not run.
pub fn error_comment(err: &impl Display) -> String {
    format!("Code review error: {err}")
}
