//! Filesystem-safe slugs derived from human titles.

/// Maximum slug length in characters.
const MAX_LEN: usize = 50;

/// Derives a slug: lowercase, runs of non-alphanumerics collapsed to a
/// single `-`, no leading or trailing hyphen, at most 50 characters.
/// Idempotent. Inputs with no usable characters slug to `untitled`.
pub fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LEN));
    let mut last_was_hyphen = true;

    for ch in input.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.is_empty() { "untitled".to_string() } else { out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Hello, World!", "hello-world")]
    #[case("  spaced   out  ", "spaced-out")]
    #[case("already-a-slug", "already-a-slug")]
    #[case("Ünïcöde Tîtle", "n-c-de-t-tle")]
    #[case("___", "untitled")]
    #[case("", "untitled")]
    fn test_slug_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slug(input), expected);
    }

    #[test]
    fn test_slug_truncates_to_fifty() {
        let long = "a".repeat(120);
        assert_eq!(slug(&long).len(), 50);
    }

    #[test]
    fn test_slug_no_trailing_hyphen_after_truncation() {
        // Truncation must not leave a dangling hyphen.
        let input = format!("{} tail", "b".repeat(49));
        let s = slug(&input);
        assert!(!s.ends_with('-'));
        assert!(s.len() <= 50);
    }

    #[test]
    fn test_slug_idempotent() {
        for input in ["Hello, World!", "a b c", "MIXED case-Title 42"] {
            let once = slug(input);
            assert_eq!(slug(&once), once);
        }
    }

    #[test]
    fn test_slug_shape() {
        let s = slug("A Very! Strange?? Title -- with // junk");
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!s.starts_with('-') && !s.ends_with('-'));
    }
}
