use crate::Result;
use core::num::NonZeroUsize;

/// Groups the items of a fallible iterator into shards of at most `size` items.
///
/// The first error ends the shard in progress and is yielded on its own.
#[derive(Debug)]
pub struct Shards<I> {
    inner: I,
    size: usize,
    done: bool,
}

impl<I> Shards<I> {
    pub const fn new(inner: I, size: NonZeroUsize) -> Self {
        Self {
            inner,
            size: size.get(),
            done: false,
        }
    }
}

impl<T, I: Iterator<Item = Result<T>>> Iterator for Shards<I> {
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut shard = Vec::with_capacity(self.size);
        while shard.len() < self.size {
            match self.inner.next() {
                Some(Ok(item)) => shard.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if shard.is_empty() { None } else { Some(Ok(shard)) }
    }
}
