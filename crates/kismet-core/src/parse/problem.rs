use std::sync::LazyLock;

use regex::Regex;

pub const PROBLEM_TITLE_PATTERN: &str = r"### Problem: (.*)";

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PROBLEM_TITLE_PATTERN).unwrap());

/// Title from the `### Problem: <title>` heading, if present and non-blank.
pub fn extract_problem_title(response: &str) -> Option<String> {
    TITLE_RE
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let response = "### Problem: Two Sum\n\n**Description:**\nGiven an array...";
        assert_eq!(extract_problem_title(response).as_deref(), Some("Two Sum"));
    }

    #[test]
    fn test_extract_title_first_match_only() {
        let response = "### Problem: LRU Cache  \n### Problem: Other";
        assert_eq!(extract_problem_title(response).as_deref(), Some("LRU Cache"));
    }

    #[test]
    fn test_extract_title_missing() {
        assert_eq!(extract_problem_title("## Two Sum"), None);
        assert_eq!(extract_problem_title("### Problem:   "), None);
    }
}
