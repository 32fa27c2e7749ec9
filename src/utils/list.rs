//! Doubly linked FIFO threaded through a [`Slab`].
//!
//! Every queued entry is addressable by the [`Key`] returned from
//! [`LinkedQueue::push_back`], so a pending operation can unlink itself from
//! the middle of the queue in O(1) when it is cancelled.

use crate::utils::slab::{Key, Slab};

struct Node<T> {
    value: T,
    prev: Option<Key>,
    next: Option<Key>,
}

pub(crate) struct LinkedQueue<T> {
    nodes: Slab<Node<T>>,
    head: Option<Key>,
    tail: Option<Key>,
}

impl<T> LinkedQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn push_back(&mut self, value: T) -> Key {
        let key = self.nodes.insert(Node {
            value,
            prev: self.tail,
            next: None,
        });

        match self.tail.and_then(|tail| self.nodes.get_mut(tail)) {
            Some(tail) => tail.next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);

        key
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        self.remove(head)
    }

    /// Unlinks the entry behind `key`, returning `None` if it already left
    /// the queue.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let node = self.nodes.remove(key)?;

        match node.prev.and_then(|prev| self.nodes.get_mut(prev)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|next| self.nodes.get_mut(next)) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }

        Some(node.value)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.pop_front())
    }
}

impl<T> Default for LinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
