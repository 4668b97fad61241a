//! Vector math used by similarity search and the preference model.

use feedloom_core::store::IndexHit;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 for empty, mismatched, or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// `1 - cosine_similarity`, in [0, 2].
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Arithmetic mean of equally sized vectors.
///
/// Vectors whose length differs from the first one are ignored. Returns
/// `None` when there is nothing to average.
pub fn mean_vector<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum: Vec<f64> = Vec::new();
    let mut count = 0usize;

    for v in vectors {
        if count == 0 {
            if v.is_empty() {
                continue;
            }
            sum = vec![0.0; v.len()];
        } else if v.len() != sum.len() {
            continue;
        }
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += *x as f64;
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }
    Some(sum.into_iter().map(|s| (s / count as f64) as f32).collect())
}

/// Rank candidates by cosine distance to `query`, closest first, keep `n`.
///
/// Candidates without an embedding are skipped. Ties keep input order.
pub fn nearest(candidates: Vec<IndexHit>, query: &[f32], n: usize) -> Vec<IndexHit> {
    let mut scored: Vec<IndexHit> = candidates
        .into_iter()
        .filter_map(|mut hit| {
            let distance = cosine_distance(hit.embedding.as_deref()?, query);
            hit.distance = Some(distance);
            Some(hit)
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(n);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedloom_core::store::{IndexEntry, ItemMetadata};

    fn hit(id: &str, embedding: Option<Vec<f32>>) -> IndexHit {
        IndexHit {
            entry: IndexEntry {
                id: id.into(),
                document: String::new(),
                metadata: ItemMetadata::default(),
            },
            distance: None,
            embedding,
        }
    }

    #[test]
    fn nearest_orders_by_distance() {
        let candidates = vec![
            hit("far", Some(vec![0.0, 1.0])),
            hit("none", None),
            hit("near", Some(vec![1.0, 0.1])),
            hit("exact", Some(vec![2.0, 0.0])),
        ];
        let ranked = nearest(candidates, &[1.0, 0.0], 2);
        let ids: Vec<&str> = ranked.iter().map(|h| h.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert!(ranked[0].distance.unwrap().abs() < 1e-6);
    }

    #[test]
    fn identical_vectors_similarity_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_similarity_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_distance_is_two() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs_give_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn mean_of_two_vectors() {
        let a = [1.0f32, 3.0];
        let b = [3.0f32, 5.0];
        let mean = mean_vector([&a[..], &b[..]]).unwrap();
        assert_eq!(mean, vec![2.0, 4.0]);
    }

    #[test]
    fn mean_skips_mismatched_lengths() {
        let a = [2.0f32, 2.0];
        let b = [9.0f32];
        let mean = mean_vector([&a[..], &b[..]]).unwrap();
        assert_eq!(mean, vec![2.0, 2.0]);
        assert!(mean_vector(std::iter::empty::<&[f32]>()).is_none());
    }
}
