//! Edit-distance scoring

/// Smallest edit distance between `pattern` and any substring of `text`.
///
/// Same recurrence as Levenshtein, except a match may start and end anywhere
/// in `text`: the first row is all zeros and the answer is the minimum of the
/// last row.
pub fn substring_distance(pattern: &[char], text: &[char]) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    let n = text.len();
    let mut prev = vec![0usize; n + 1];
    let mut cur = vec![0usize; n + 1];

    for (i, p) in pattern.iter().enumerate() {
        cur[0] = i + 1;
        for j in 1..=n {
            let cost = if *p == text[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev.into_iter().min().unwrap_or(pattern.len())
}

/// 0.0 for an exact occurrence of `token` inside `keyword`, up to 1.0 for no resemblance.
pub fn score(token: &[char], keyword: &[char]) -> f64 {
    if token.is_empty() {
        return 1.0;
    }
    let distance = substring_distance(token, keyword);
    (distance as f64 / token.len() as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_exact_substring_scores_zero() {
        assert_eq!(substring_distance(&chars("envio"), &chars("costo de envio")), 0);
        assert_eq!(score(&chars("precio"), &chars("precio")), 0.0);
    }

    #[test]
    fn test_typos_cost_one_edit_each() {
        assert_eq!(substring_distance(&chars("delivey"), &chars("delivery")), 1);
        assert_eq!(substring_distance(&chars("preico"), &chars("precio")), 2);
        assert!((score(&chars("precios"), &chars("precio")) - 1.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_unrelated_words_score_high() {
        assert!(score(&chars("zapatos"), &chars("horario")) >= 0.6);
        assert_eq!(score(&chars("abc"), &chars("")), 1.0);
    }

    #[test]
    fn test_non_ascii_characters_count_once() {
        assert_eq!(substring_distance(&chars("atención"), &chars("atencion")), 1);
    }
}
