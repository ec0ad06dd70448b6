use crate::ContentQuery;

/// Per-request progress state.
///
/// Owned by exactly one engine run; never shared between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCursor {
    offset: usize,
    count: usize,
    emitted: usize,
    done: bool,
}

impl RequestCursor {
    pub fn new(count: usize, offset: usize) -> Self {
        Self {
            offset,
            count,
            emitted: 0,
            done: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn remaining(&self) -> usize {
        self.count - self.emitted
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Records one item handed to the sink. Marks the cursor done once the
    /// requested count is reached.
    pub(crate) fn record_emit(&mut self) {
        debug_assert!(self.emitted < self.count, "cursor over-emitted");
        self.emitted += 1;
        if self.emitted == self.count {
            self.done = true;
        }
    }

    pub(crate) fn finish(&mut self) {
        self.done = true;
    }
}

impl From<ContentQuery> for RequestCursor {
    fn from(query: ContentQuery) -> Self {
        Self::new(query.count, query.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_remaining_and_completion() {
        let mut cursor = RequestCursor::new(2, 5);
        assert_eq!(cursor.remaining(), 2);
        assert!(!cursor.is_done());

        cursor.record_emit();
        assert_eq!(cursor.remaining(), 1);
        assert!(!cursor.is_done());

        cursor.record_emit();
        assert_eq!(cursor.emitted(), 2);
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.is_done());
        assert_eq!(cursor.offset(), 5);
    }

    #[test]
    fn converts_from_query() {
        let cursor = RequestCursor::from(ContentQuery::new(4, 1));
        assert_eq!(cursor.count(), 4);
        assert_eq!(cursor.offset(), 1);
        assert_eq!(cursor.emitted(), 0);
    }
}
