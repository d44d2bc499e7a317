/// Length of the longest common subsequence of two token streams.
///
/// Rows follow `reference`, columns follow `typed`. Only two rows of the
/// `(R + 1) x (T + 1)` table are kept since each row depends on the previous
/// one alone. Tokens are compared for exact equality, so two empty tokens
/// match each other.
pub fn lcs_len<T: PartialEq>(reference: &[T], typed: &[T]) -> usize {
    if reference.is_empty() || typed.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; typed.len() + 1];
    let mut curr = vec![0usize; typed.len() + 1];

    for ref_token in reference {
        for (j, typed_token) in typed.iter().enumerate() {
            curr[j + 1] = if ref_token == typed_token {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[typed.len()]
}
