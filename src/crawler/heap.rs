//! Binary heap ordered by a caller-supplied dominance relation

/// `dominates(x, y)` is true when `x` must come out before, or together
/// with, `y`
type Dominance<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Binary heap over a growable buffer
///
/// Only insertion and extraction of the dominating element are supported;
/// there is no removal by value or priority update.
pub struct Heap<T> {
    items: Vec<T>,
    dominates: Dominance<T>,
}

impl<T: Ord + 'static> Heap<T> {
    /// Smallest element first
    pub fn min() -> Self {
        Self::with_dominance(|a: &T, b: &T| a <= b)
    }

    /// Largest element first
    pub fn max() -> Self {
        Self::with_dominance(|a: &T, b: &T| a >= b)
    }
}

impl<T> Heap<T> {
    /// Heap ordered by an arbitrary dominance relation
    pub fn with_dominance<F>(dominates: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            items: Vec::new(),
            dominates: Box::new(dominates),
        }
    }

    /// Heap ordered by a derived priority, lowest value first
    ///
    /// # Examples
    ///
    /// ```
    /// use warc_crawler::crawler::Heap;
    ///
    /// let mut heap = Heap::by_key(|s: &String| s.len());
    /// heap.add("https://example.com/long/path".to_string());
    /// heap.add("https://example.com/".to_string());
    /// assert_eq!(heap.extract_dominating().as_deref(), Some("https://example.com/"));
    /// ```
    pub fn by_key<K, F>(priority: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::with_dominance(move |a, b| priority(a) <= priority(b))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The element `extract_dominating` would return
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Inserts an element and restores the heap order upwards
    pub fn add(&mut self, item: T) {
        self.items.push(item);
        let mut child = self.items.len() - 1;
        while child > 0 {
            let parent = (child - 1) / 2;
            if (self.dominates)(&self.items[parent], &self.items[child]) {
                break;
            }
            self.items.swap(parent, child);
            child = parent;
        }
    }

    /// Removes and returns the dominating element
    pub fn extract_dominating(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop();

        let len = self.items.len();
        let mut parent = 0;
        loop {
            let left = 2 * parent + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut best = left;
            if right < len && !(self.dominates)(&self.items[left], &self.items[right]) {
                best = right;
            }
            if (self.dominates)(&self.items[parent], &self.items[best]) {
                break;
            }
            self.items.swap(parent, best);
            parent = best;
        }
        top
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap").field("items", &self.items).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T>(heap: &mut Heap<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = heap.extract_dominating() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_min_heap_order() {
        let mut heap = Heap::min();
        for n in [5, 3, 9, 1, 1, 7, 2, 8, 0, 6] {
            heap.add(n);
        }
        assert_eq!(heap.len(), 10);
        assert_eq!(heap.peek(), Some(&0));
        assert_eq!(drain(&mut heap), vec![0, 1, 1, 2, 3, 5, 6, 7, 8, 9]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_max_heap_order() {
        let mut heap = Heap::max();
        for n in [4, 10, 3, 5, 1] {
            heap.add(n);
        }
        assert_eq!(drain(&mut heap), vec![10, 5, 4, 3, 1]);
    }

    #[test]
    fn test_by_key_order() {
        let mut heap = Heap::by_key(|s: &&str| s.len());
        for s in ["ccc", "a", "bb", "dddd", "e"] {
            heap.add(s);
        }
        let lengths: Vec<usize> = drain(&mut heap).iter().map(|s| s.len()).collect();
        assert_eq!(lengths, vec![1, 1, 2, 3, 4]);
    }

    #[test]
    fn test_count_decreases_to_zero() {
        let mut heap = Heap::min();
        let values: Vec<u64> = (0..200).map(|i| (i * 7919) % 211).collect();
        for v in &values {
            heap.add(*v);
        }

        let mut previous = None;
        for remaining in (0..values.len()).rev() {
            let v = heap.extract_dominating().unwrap();
            if let Some(p) = previous {
                assert!(p <= v);
            }
            previous = Some(v);
            assert_eq!(heap.len(), remaining);
        }
        assert_eq!(heap.extract_dominating(), None);
    }

    #[test]
    fn test_interleaved_add_and_extract() {
        let mut heap = Heap::min();
        heap.add(5);
        heap.add(2);
        assert_eq!(heap.extract_dominating(), Some(2));
        heap.add(1);
        heap.add(9);
        assert_eq!(heap.extract_dominating(), Some(1));
        assert_eq!(heap.extract_dominating(), Some(5));
        heap.clear();
        assert!(heap.is_empty());
    }
}
