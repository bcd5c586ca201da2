use std::sync::Arc;

use bzz_primitives::Address;

use crate::Node;

/// Bounded set of connected nodes sharing one proximity order.
///
/// When full, inserting evicts the least recently active entry: a connected
/// newcomer always wins over an idle incumbent.
#[derive(Debug)]
pub struct Bucket<N> {
    capacity: usize,
    nodes: Vec<Arc<N>>,
}

impl<N: Node> Bucket<N> {
    /// Bucket holding at most `capacity` nodes (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, nodes: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<N>> {
        self.nodes.iter()
    }

    pub fn get(&self, addr: &Address) -> Option<&Arc<N>> {
        self.nodes.iter().find(|n| n.addr() == *addr)
    }

    /// Insert a node, returning the evicted entry if the bucket was full.
    ///
    /// The caller must have removed any entry with the same address first.
    pub fn insert(&mut self, node: Arc<N>) -> Option<Arc<N>> {
        let evicted = if self.is_full() {
            let lra = self
                .nodes
                .iter()
                .enumerate()
                .min_by_key(|(_, n)| n.last_active())
                .map(|(idx, _)| idx);
            lra.map(|idx| self.nodes.remove(idx))
        } else {
            None
        };
        self.nodes.push(node);
        evicted
    }

    /// Remove this exact instance. Returns false if it is not present, e.g.
    /// because it was already replaced by a newer connection.
    pub fn remove(&mut self, node: &Arc<N>) -> bool {
        match self.nodes.iter().position(|n| Arc::ptr_eq(n, node)) {
            Some(idx) => {
                self.nodes.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Remove and return every node.
    pub fn drain(&mut self) -> impl Iterator<Item = Arc<N>> + '_ {
        self.nodes.drain(..)
    }

    /// Remove whichever instance currently holds `addr`.
    pub fn remove_addr(&mut self, addr: &Address) -> Option<Arc<N>> {
        let idx = self.nodes.iter().position(|n| n.addr() == *addr)?;
        Some(self.nodes.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestNode {
        addr: Address,
        active: u64,
    }

    impl Node for TestNode {
        fn addr(&self) -> Address {
            self.addr
        }
        fn url(&self) -> String {
            format!("test://{}", self.addr)
        }
        fn last_active(&self) -> u64 {
            self.active
        }
        fn disconnect(&self) {}
    }

    fn node(byte: u8, active: u64) -> Arc<TestNode> {
        Arc::new(TestNode { addr: Address::repeat_byte(byte), active })
    }

    #[test]
    fn test_insert_until_full() {
        let mut bucket = Bucket::new(2);
        assert!(bucket.insert(node(1, 10)).is_none());
        assert!(bucket.insert(node(2, 20)).is_none());
        assert!(bucket.is_full());
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn test_evicts_least_recently_active() {
        let mut bucket = Bucket::new(2);
        bucket.insert(node(1, 30));
        bucket.insert(node(2, 10));

        let evicted = bucket.insert(node(3, 5)).unwrap();
        assert_eq!(evicted.addr, Address::repeat_byte(2));
        assert_eq!(bucket.len(), 2);
        assert!(bucket.get(&Address::repeat_byte(3)).is_some());
    }

    #[test]
    fn test_remove_by_identity() {
        let mut bucket = Bucket::new(4);
        let old = node(1, 1);
        let new = node(1, 2);
        bucket.insert(Arc::clone(&old));

        assert!(bucket.remove_addr(&old.addr).is_some());
        bucket.insert(Arc::clone(&new));

        assert!(!bucket.remove(&old));
        assert_eq!(bucket.len(), 1);
        assert!(bucket.remove(&new));
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut bucket = Bucket::new(0);
        assert_eq!(bucket.capacity(), 1);
        assert!(bucket.insert(node(1, 1)).is_none());
        assert!(bucket.insert(node(2, 2)).is_some());
        assert_eq!(bucket.len(), 1);
    }
}
