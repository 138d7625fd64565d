//! Edit distance over strings.

use super::DistanceFunction;
use crate::errors::IndexResult;

/// Levenshtein distance over Unicode scalar values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Levenshtein;

impl Levenshtein {
    fn edits(a: &str, b: &str) -> IndexResult<usize> {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let mut prev: Vec<usize> = Vec::new();
        prev.try_reserve(b.len() + 1)?;
        prev.extend(0..=b.len());
        let mut cur = vec![0usize; b.len() + 1];
        for (i, ca) in a.iter().enumerate() {
            cur[0] = i + 1;
            for (j, cb) in b.iter().enumerate() {
                let substitution = prev[j] + usize::from(ca != cb);
                cur[j + 1] = substitution.min(prev[j + 1] + 1).min(cur[j] + 1);
            }
            std::mem::swap(&mut prev, &mut cur);
        }
        Ok(prev[b.len()])
    }
}

impl DistanceFunction<str> for Levenshtein {
    fn distance(&self, a: &str, b: &str) -> IndexResult<f64> {
        Ok(Self::edits(a, b)? as f64)
    }
}

impl DistanceFunction<String> for Levenshtein {
    fn distance(&self, a: &String, b: &String) -> IndexResult<f64> {
        Ok(Self::edits(a, b)? as f64)
    }
}
