use chrono::{DateTime, Duration, Utc};

use crate::config::RetrievalConfig;

/// Cosine similarity in `[-1, 1]`. Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    dot / magnitude
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Fraction of query words that occur in `content`.
///
/// Query words are not deduplicated, so "pizza pizza" counts the match twice
/// in both numerator and denominator.
pub fn keyword_overlap(query: &str, content: &str) -> f64 {
    let query_words = tokenize(query);
    if query_words.is_empty() {
        return 0.0;
    }
    let content_words = tokenize(content);
    let hits = query_words
        .iter()
        .filter(|w| content_words.contains(w))
        .count();
    hits as f64 / query_words.len() as f64
}

/// Linear decay from 1 at `now` to 0 at `window` old. Future timestamps clamp to 1.
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> f64 {
    let window_ms = window.num_milliseconds();
    if window_ms <= 0 {
        return 0.0;
    }
    let age_ms = (now - created_at).num_milliseconds().max(0);
    (1.0 - age_ms as f64 / window_ms as f64).max(0.0)
}

pub fn keyword_recency_score(
    query: &str,
    content: &str,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &RetrievalConfig,
) -> f64 {
    let recency = match Duration::try_days(config.recency_window_days) {
        Some(window) => recency_score(created_at, now, window),
        None => 0.0,
    };
    config.keyword_weight * keyword_overlap(query, content) + config.recency_weight * recency
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_cosine_self_similarity_is_one() {
        let v = [0.3, -1.2, 4.5, 0.0, 2.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let a = [1.0, 2.0, 3.0];
        let b = [-0.5, 4.0, 0.25];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < EPS);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < EPS);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_keyword_overlap() {
        assert!((keyword_overlap("pizza", "I like pizza") - 1.0).abs() < EPS);
        assert!((keyword_overlap("Pizza  Pasta", "pizza is great") - 0.5).abs() < EPS);
        assert_eq!(keyword_overlap("pizza", "what is your name"), 0.0);
        // Extra content words are not penalised.
        assert!((keyword_overlap("hola", "hola hola amigo como estas") - 1.0).abs() < EPS);
    }

    #[test]
    fn test_keyword_overlap_keeps_repeated_query_words() {
        // 2 of 3 tokens match: "pizza" twice, "now" never.
        assert!((keyword_overlap("pizza pizza now", "pizza") - 2.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_empty_query_scores_zero() {
        assert_eq!(keyword_overlap("", "anything"), 0.0);
        assert_eq!(keyword_overlap("   \t\n", "anything"), 0.0);
    }

    #[test]
    fn test_recency_decay() {
        let now = Utc::now();
        let window = Duration::days(7);
        assert!((recency_score(now, now, window) - 1.0).abs() < EPS);
        let half = recency_score(now - Duration::hours(84), now, window);
        assert!((half - 0.5).abs() < EPS);
        assert_eq!(recency_score(now - Duration::days(30), now, window), 0.0);
        assert!((recency_score(now + Duration::hours(1), now, window) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_combined_score_weights() {
        let now = Utc::now();
        let config = RetrievalConfig::default();
        let fresh_match = keyword_recency_score("pizza", "pizza", now, now, &config);
        assert!((fresh_match - 1.0).abs() < EPS);
        let old_match =
            keyword_recency_score("pizza", "pizza", now - Duration::days(8), now, &config);
        assert!((old_match - 0.7).abs() < EPS);
        let fresh_miss = keyword_recency_score("pizza", "sushi", now, now, &config);
        assert!((fresh_miss - 0.3).abs() < EPS);
    }

    #[test]
    fn test_out_of_range_window_drops_recency() {
        let now = Utc::now();
        let config = RetrievalConfig {
            recency_window_days: i64::MAX,
            ..Default::default()
        };
        let score = keyword_recency_score("pizza", "pizza", now, now, &config);
        assert!((score - 0.7).abs() < EPS);
    }
}
