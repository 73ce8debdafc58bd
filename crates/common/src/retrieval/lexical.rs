//! Term-frequency similarity used to rank re-chunked windows

use crate::text;
use std::collections::BTreeMap;

/// Raw term counts of `text`
pub fn term_frequencies(text: &str) -> BTreeMap<String, f32> {
    let mut tf = BTreeMap::new();
    for term in text::terms(text) {
        *tf.entry(term).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine of two sparse term vectors; 0 when either is empty
pub fn cosine(a: &BTreeMap<String, f32>, b: &BTreeMap<String, f32>) -> f32 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f32 = small
        .iter()
        .filter_map(|(term, x)| large.get(term).map(|y| x * y))
        .sum();

    let norm_a = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub fn tf_cosine(query: &str, text: &str) -> f32 {
    cosine(&term_frequencies(query), &term_frequencies(text))
}
