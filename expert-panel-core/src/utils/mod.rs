//! Utility functions and helpers

/// Create a safe filename from a string
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
///
/// Counts characters rather than bytes so CJK replies are cut evenly.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("hello world"), "hello_world");
        assert_eq!(safe_filename("user:7/session"), "user_7_session");
        assert_eq!(
            safe_filename("3f1c2a9e-0b7d-4f5e-9a61-2c8d7e6f5a4b"),
            "3f1c2a9e-0b7d-4f5e-9a61-2c8d7e6f5a4b"
        );
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("招生活动方案", 2), "招生...");
    }
}
