//! SQL LIKE matching.
//!
//! `_` matches exactly one code point, `%` matches zero or more, `\` escapes
//! the next character (including itself). Matching is case-insensitive using
//! simple case folding and keeps a single backtrack point at the most recent
//! `%`, for O(n*m) worst case.

use crate::error::EvalError;

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Match `pattern` against `text` with SQL LIKE semantics.
pub fn like_match(pattern: &str, text: &str) -> Result<bool, EvalError> {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    // (pattern index after %, text index the % currently covers up to)
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '%' => {
                    star = Some((pi + 1, ti));
                    pi += 1;
                    continue;
                }
                '_' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' => {
                    let Some(&escaped) = p.get(pi + 1) else {
                        return Err(EvalError::BadLikePattern(
                            "trailing escape character".into(),
                        ));
                    };
                    if fold(escaped) == fold(t[ti]) {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if fold(c) == fold(t[ti]) {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }
        // Mismatch: widen the most recent % by one code point, or fail.
        match star {
            Some((after_star, covered)) => {
                pi = after_star;
                ti = covered + 1;
                star = Some((after_star, covered + 1));
            }
            None => return Ok(false),
        }
    }

    // Validate the pattern tail and let trailing % absorb nothing.
    while pi < p.len() {
        match p[pi] {
            '%' => pi += 1,
            '\\' if pi + 1 >= p.len() => {
                return Err(EvalError::BadLikePattern(
                    "trailing escape character".into(),
                ));
            }
            _ => break,
        }
    }
    Ok(pi == p.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_matches_zero_or_more() {
        assert!(like_match("A%B%C", "AxByyC").unwrap());
        assert!(like_match("A%B%C", "ABC").unwrap());
        assert!(!like_match("A%B%C", "AxByy").unwrap());
        assert!(like_match("%", "").unwrap());
        assert!(like_match("%", "anything").unwrap());
    }

    #[test]
    fn underscore_matches_exactly_one() {
        assert!(like_match("_B", "AB").unwrap());
        assert!(!like_match("_B", "AAB").unwrap());
        assert!(!like_match("_B", "B").unwrap());
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(like_match("hello%", "HELLO world").unwrap());
        assert!(like_match("ÉTÉ", "été").unwrap());
    }

    #[test]
    fn escape_makes_wildcards_literal() {
        assert!(like_match(r"100\%", "100%").unwrap());
        assert!(!like_match(r"100\%", "1000").unwrap());
        assert!(like_match(r"a\\b", r"a\b").unwrap());
        assert!(like_match(r"a\_c", "a_c").unwrap());
        assert!(!like_match(r"a\_c", "abc").unwrap());
    }

    #[test]
    fn trailing_escape_is_an_error() {
        assert!(like_match(r"abc\", "abc").is_err());
    }

    #[test]
    fn backtracking_revisits_last_percent() {
        assert!(like_match("%abc", "ababc").unwrap());
        assert!(like_match("a%bc", "abbc").unwrap());
        assert!(!like_match("a%bc", "abcb").unwrap());
    }

    #[test]
    fn multibyte_code_points_count_as_one() {
        assert!(like_match("_", "é").unwrap());
        assert!(like_match("caf_", "café").unwrap());
    }
}
