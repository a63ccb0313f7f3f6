//! Batch chunking for the CRM's per-call id limit.

/// Maximum number of ids the CRM accepts in a single batch call.
pub const CRM_BATCH_LIMIT: usize = 100;

/// Split a list of ids into chunks the CRM batch endpoints will accept.
///
/// Every chunk except possibly the last has exactly [`CRM_BATCH_LIMIT`]
/// elements; an empty input yields no chunks.
pub fn chunk_ids<T>(ids: &[T]) -> impl Iterator<Item = &[T]> {
    ids.chunks(CRM_BATCH_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id-{}", i)).collect()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let input: Vec<String> = Vec::new();
        assert_eq!(chunk_ids(&input).count(), 0);
    }

    #[test]
    fn test_input_below_limit_is_single_chunk() {
        let input = ids(42);
        let chunks: Vec<_> = chunk_ids(&input).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 42);
    }

    #[test]
    fn test_input_at_limit_is_single_chunk() {
        let input = ids(CRM_BATCH_LIMIT);
        assert_eq!(chunk_ids(&input).count(), 1);
    }

    #[test]
    fn test_no_chunk_exceeds_limit() {
        let input = ids(257);
        let chunks: Vec<_> = chunk_ids(&input).collect();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= CRM_BATCH_LIMIT));
        assert_eq!(chunks[2].len(), 57);
    }

    #[test]
    fn test_chunks_preserve_order() {
        let input = ids(150);
        let flattened: Vec<_> = chunk_ids(&input).flatten().cloned().collect();
        assert_eq!(flattened, input);
    }
}
