/// Characters entered so far, bounded by the reference length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    chars: Vec<char>,
    limit: usize,
    allow_removal: bool,
}

impl Transcript {
    pub fn new(limit: usize, allow_removal: bool) -> Self {
        Self {
            chars: Vec::with_capacity(limit),
            limit,
            allow_removal,
        }
    }

    /// Appends `c` unless the transcript is already full.
    pub fn push(&mut self, c: char) -> bool {
        if self.is_full() {
            return false;
        }
        self.chars.push(c);
        true
    }

    /// Removes the last character when removal is permitted.
    pub fn pop(&mut self) -> Option<char> {
        if !self.allow_removal {
            return None;
        }
        self.chars.pop()
    }

    pub fn is_full(&self) -> bool {
        self.chars.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn allows_removal(&self) -> bool {
        self.allow_removal
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_truncates_at_limit() {
        let mut transcript = Transcript::new(2, false);
        assert!(transcript.push('a'));
        assert!(transcript.push('b'));
        assert!(!transcript.push('c'));
        assert_eq!(transcript.as_string(), "ab");
        assert!(transcript.is_full());
    }

    #[test]
    fn test_pop_rejected_by_default() {
        let mut transcript = Transcript::new(5, false);
        transcript.push('a');
        assert_eq!(transcript.pop(), None);
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn test_pop_when_allowed() {
        let mut transcript = Transcript::new(5, true);
        transcript.push('a');
        transcript.push('b');
        assert_eq!(transcript.pop(), Some('b'));
        assert_eq!(transcript.as_string(), "a");
        transcript.pop();
        assert_eq!(transcript.pop(), None);
    }

    #[test]
    fn test_zero_limit() {
        let mut transcript = Transcript::new(0, true);
        assert!(!transcript.push('a'));
        assert!(transcript.is_empty());
    }
}
