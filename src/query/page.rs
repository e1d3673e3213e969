use std::fmt;

/// One page of query results
///
/// Iterating the page consumes its items. `total` is the number of matches
/// before slicing, or `None` for a streamed page.
pub struct Page<'s, T> {
    items: Box<dyn Iterator<Item = T> + 's>,
    offset: usize,
    limit: i64,
    total: Option<usize>,
}

impl<'s, T> Page<'s, T> {
    pub(crate) fn new(items: Box<dyn Iterator<Item = T> + 's>, offset: usize, limit: i64, total: Option<usize>) -> Self {
        Page {
            items,
            offset,
            limit,
            total,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn is_streaming(&self) -> bool {
        self.total.is_none()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items.collect()
    }
}

impl<'s, T> Iterator for Page<'s, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.next()
    }
}

impl<'s, T> fmt::Debug for Page<'s, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

/// Apply offset and limit: a negative limit is unbounded, zero is empty
pub(crate) fn slice<'s, T: 's>(
    items: impl Iterator<Item = T> + 's,
    offset: usize,
    limit: i64,
) -> Box<dyn Iterator<Item = T> + 's> {
    let items = items.skip(offset);
    if limit < 0 {
        Box::new(items)
    } else {
        Box::new(items.take(limit as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_bounds() {
        let take = |o, l| slice(0..10, o, l).collect::<Vec<_>>();
        assert_eq!(take(0, 3), vec![0, 1, 2]);
        assert_eq!(take(8, 5), vec![8, 9]);
        assert_eq!(take(12, 5), Vec::<i32>::new());
        assert_eq!(take(7, -1), vec![7, 8, 9]);
        assert!(take(0, 0).is_empty());
    }
}
