//! Glob matching for destination host whitelists
//!
//! `*` matches any run of characters (including none) and `?` matches exactly
//! one character. Every other character matches itself, case-sensitively.

/// Match `text` against a single glob pattern
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Match `text` against any of the given patterns
pub fn matches_any<'a, I>(patterns: I, text: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    patterns
        .into_iter()
        .any(|pattern| glob_match(pattern, text))
}
