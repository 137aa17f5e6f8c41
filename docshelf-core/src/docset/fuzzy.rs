//! Subsequence scoring for fuzzy symbol search
//!
//! A dynamic-programming scorer in the style of fzy: every query character
//! must appear in the candidate in order, and the best alignment is the one
//! that maximizes boundary bonuses minus gap penalties.

const SCORE_GAP_LEADING: f64 = -0.005;
const SCORE_GAP_TRAILING: f64 = -0.005;
const SCORE_GAP_INNER: f64 = -0.01;
const SCORE_MATCH_CONSECUTIVE: f64 = 1.0;
const SCORE_MATCH_SLASH: f64 = 0.9;
const SCORE_MATCH_WORD: f64 = 0.8;
const SCORE_MATCH_CAPITAL: f64 = 0.7;
const SCORE_MATCH_DOT: f64 = 0.6;

/// Candidates (and queries) longer than this never match
pub const MAX_LEN: usize = 1024;

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn bonuses(haystack: &[char]) -> Vec<f64> {
    // The first character is treated as following a path separator
    let mut last = '/';
    haystack
        .iter()
        .map(|&ch| {
            let bonus = match last {
                '/' | '\\' => SCORE_MATCH_SLASH,
                '-' | '_' | ' ' => SCORE_MATCH_WORD,
                '.' | ':' => SCORE_MATCH_DOT,
                l if l.is_lowercase() && ch.is_uppercase() => SCORE_MATCH_CAPITAL,
                _ => 0.0,
            };
            last = ch;
            bonus
        })
        .collect()
}

fn is_subsequence(needle: &[char], haystack: &[char]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|n| rest.any(|h| h == n))
}

/// Score `needle` against `haystack`, case-insensitively
///
/// Returns `None` when `needle` is not a subsequence of `haystack`. A full
/// length match scores `f64::INFINITY`.
pub fn score(needle: &str, haystack: &str) -> Option<f64> {
    let needle: Vec<char> = needle.chars().map(fold).collect();
    let original: Vec<char> = haystack.chars().collect();
    let folded: Vec<char> = original.iter().copied().map(fold).collect();

    let n = needle.len();
    let m = folded.len();
    if n == 0 || m == 0 || n > m || m > MAX_LEN {
        return None;
    }
    if n == m {
        return (needle == folded).then_some(f64::INFINITY);
    }
    if !is_subsequence(&needle, &folded) {
        return None;
    }

    let bonus = bonuses(&original);

    // d[j]: best score ending with a match at j; best[j]: best score up to j
    let mut prev_d = vec![f64::NEG_INFINITY; m];
    let mut prev_best = vec![f64::NEG_INFINITY; m];
    let mut d = vec![f64::NEG_INFINITY; m];
    let mut best = vec![f64::NEG_INFINITY; m];

    for (i, &nc) in needle.iter().enumerate() {
        let gap = if i == n - 1 {
            SCORE_GAP_TRAILING
        } else {
            SCORE_GAP_INNER
        };
        let mut running = f64::NEG_INFINITY;

        for j in 0..m {
            if folded[j] == nc {
                let matched = if i == 0 {
                    j as f64 * SCORE_GAP_LEADING + bonus[j]
                } else if j > 0 {
                    (prev_best[j - 1] + bonus[j]).max(prev_d[j - 1] + SCORE_MATCH_CONSECUTIVE)
                } else {
                    f64::NEG_INFINITY
                };
                d[j] = matched;
                running = matched.max(running + gap);
            } else {
                d[j] = f64::NEG_INFINITY;
                running += gap;
            }
            best[j] = running;
        }

        std::mem::swap(&mut prev_d, &mut d);
        std::mem::swap(&mut prev_best, &mut best);
    }

    let result = prev_best[m - 1];
    result.is_finite().then_some(result)
}
