//! Unbounded FIFO channel made of a chain of AVars.
//!
//! The channel is a linked stream of cells. Each cell is an AVar that a
//! writer fills exactly once with an [`Item`]: the value plus the next, still
//! empty, cell. `write` points at the empty cell at the end of the stream and
//! `read` at the first cell not yet consumed by this reader.

use crate::avar::AVar;
use crate::error::Error;
use crate::task::Task;

use std::fmt;

type Stream<A> = AVar<Item<A>>;

#[derive(Clone)]
struct Item<A> {
    head: A,
    tail: Stream<A>,
}

/// An unbounded multi-producer channel. Each value is received by one
/// reader per [`Chan::dup`] lineage.
pub struct Chan<A> {
    read: AVar<Stream<A>>,
    write: AVar<Stream<A>>,
}

impl<A> Clone for Chan<A> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
            write: self.write.clone(),
        }
    }
}

impl<A> fmt::Debug for Chan<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chan").finish_non_exhaustive()
    }
}

impl<A: Clone + 'static> Chan<A> {
    pub fn new() -> Self {
        let hole = AVar::empty();
        Self {
            read: AVar::new(hole.clone()),
            write: AVar::new(hole),
        }
    }

    /// Appends `value`. Never blocks on readers.
    pub fn write<E: From<Error> + 'static>(&self, value: A) -> Task<(), E> {
        self.write.modify_(move |old_hole: Stream<A>| {
            let new_hole = AVar::empty();
            let item = Item {
                head: value.clone(),
                tail: new_hole.clone(),
            };
            old_hole.put(item).map(move |()| new_hole.clone())
        })
    }

    /// Receives the next value, waiting for a writer if the channel is empty.
    pub fn read<E: From<Error> + 'static>(&self) -> Task<A, E> {
        self.read.modify(|stream: Stream<A>| {
            stream.read().map(|item: Item<A>| (item.tail, item.head))
        })
    }

    /// A second reader that receives every value written from now on,
    /// independently of this one.
    pub fn dup<E: From<Error> + 'static>(&self) -> Task<Chan<A>, E> {
        let write = self.write.clone();
        self.write.read().map(move |hole| Chan {
            read: AVar::new(hole),
            write: write.clone(),
        })
    }
}

impl<A: Clone + 'static> Default for Chan<A> {
    fn default() -> Self {
        Self::new()
    }
}
