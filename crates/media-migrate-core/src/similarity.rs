//! Title similarity used to pick a destination show when no external id
//! lookup succeeded.

use media_migrate_models::SearchHit;

const EXACT_YEAR_BONUS: f64 = 0.05;
const YEAR_MISMATCH_PENALTY: f64 = 0.15;

/// Canonical form for comparing titles.
///
/// Lowercases, spells out `&`, drops apostrophes, turns other punctuation
/// into spaces, strips a leading "the" and collapses whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase().replace('&', " and ");
    let cleaned: String = lowered
        .chars()
        .filter(|c| !matches!(c, '\'' | '’'))
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() > 1 && words[0] == "the" {
        words.remove(0);
    }
    words.join(" ")
}

/// Query string for the destination search endpoint
pub fn search_query(title: &str) -> String {
    title
        .replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein similarity of the normalized titles, in `[0, 1]`.
///
/// Two empty titles are not a match.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Score nudge from release years. Unknown years leave the score alone.
pub fn year_adjustment(source_year: Option<u32>, hit_year: Option<u32>) -> f64 {
    match (source_year, hit_year) {
        (Some(a), Some(b)) if a == b => EXACT_YEAR_BONUS,
        (Some(a), Some(b)) if a.abs_diff(b) == 1 => 0.0,
        (Some(_), Some(_)) => -YEAR_MISMATCH_PENALTY,
        _ => 0.0,
    }
}

pub fn score_hit(title: &str, year: Option<u32>, hit: &SearchHit) -> f64 {
    (title_similarity(title, &hit.name) + year_adjustment(year, hit.year)).clamp(0.0, 1.0)
}

/// Highest scoring hit with its score, whatever the threshold.
///
/// Ties go to the hit whose year matches exactly, then to the lower id.
pub fn best_hit<'a>(title: &str, year: Option<u32>, hits: &'a [SearchHit]) -> Option<(&'a SearchHit, f64)> {
    hits.iter()
        .map(|hit| (hit, score_hit(title, year, hit)))
        .max_by(|(a, score_a), (b, score_b)| {
            score_a
                .total_cmp(score_b)
                .then_with(|| {
                    let a_exact = year.is_some() && a.year == year;
                    let b_exact = year.is_some() && b.year == year;
                    a_exact.cmp(&b_exact)
                })
                .then_with(|| b.id.cmp(&a.id))
        })
}

/// Whether `score` clears `threshold`, tolerating float noise at the boundary
pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score + 1e-9 >= threshold
}
