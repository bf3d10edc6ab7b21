use {
    super::{CHUNK_SIZE, Chunk, Element, Storage, VectorView},
    crate::{BorrowSexp, Error, Result, unwind_protect},
    tracing::trace,
};

/// Iterator over the elements of a vector.
///
/// Elements with direct or proxied storage are read one at a time.
/// Elements computed by an altrep class are decoded in bulk,
/// [`CHUNK_SIZE`] at a time, into a local buffer.
/// Bulk decoding may fail; the error is yielded once,
/// after which the iterator is exhausted.
pub struct Iter<'a, 'h, T>
{
    view: &'a VectorView<'h, T>,
    position: usize,

    buffer: Chunk<T>,
    // INVARIANT: buffer[i] is element block_start + i.
    block_start: usize,

    failed: bool,
}

impl<'a, 'h, T> Iter<'a, 'h, T>
    where T: Element<'h>
{
    pub (super) fn new(view: &'a VectorView<'h, T>) -> Self
    {
        Self{view, position: 0, buffer: Chunk::new(), block_start: 0, failed: false}
    }

    fn buffered(&self, index: usize) -> Option<&T>
    {
        self.buffer.get(index.checked_sub(self.block_start)?)
    }

    /// Decode the chunk that starts at `index`.
    fn refill(&mut self, index: usize) -> Result<()>
    {
        let (host, sexp) = (self.view.handle.host(), self.view.handle.sexp());
        let len = CHUNK_SIZE.min(self.view.length - index);
        let buffer = &mut self.buffer;
        let count = unwind_protect(host, || {
            T::get_region(host, sexp, index, len, buffer)
        })?;
        self.block_start = index;
        trace!(start = index, len, "refilled iteration buffer");
        if count != len {
            return Err(Error::HostCondition(format!(
                "bulk read returned {} of {} elements", count, len,
            )));
        }
        Ok(())
    }
}

impl<'a, 'h, T> Iterator for Iter<'a, 'h, T>
    where T: Element<'h>
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.failed || self.position >= self.view.length {
            return None;
        }
        let index = self.position;

        let element = match self.view.storage {
            Storage::Abstract => {
                if self.buffered(index).is_none() {
                    if let Err(err) = self.refill(index) {
                        self.failed = true;
                        return Some(Err(err));
                    }
                }
                self.buffered(index)?.clone()
            },
            // SAFETY: Position is less than the length.
            _ => unsafe { self.view.elt_unchecked(index) },
        };

        self.position += 1;
        Some(Ok(element))
    }

    fn size_hint(&self) -> (usize, Option<usize>)
    {
        if self.failed {
            return (0, Some(0));
        }
        let remaining = self.view.length - self.position;
        (remaining.min(1), Some(remaining))
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::{Integers, testing::torture},
        gchost::{Altrep, CompactIntSeq, Host},
        proptest::proptest,
        std::rc::Rc,
    };

    /// Class whose bulk reads fail past a given index.
    struct Faulty
    {
        length: usize,
        fail_from: usize,
    }

    impl Altrep<i32> for Faulty
    {
        fn class_name(&self) -> &str
        {
            "faulty"
        }

        fn length(&self) -> usize
        {
            self.length
        }

        fn elt(&self, index: usize) -> i32
        {
            index as i32
        }

        fn get_region(&self, start: usize, buf: &mut [i32]) -> std::result::Result<usize, String>
        {
            if start + buf.len() > self.fail_from {
                return Err(format!("cannot decode from {}", start));
            }
            for (offset, slot) in buf.iter_mut().enumerate() {
                *slot = (start + offset) as i32;
            }
            Ok(buf.len())
        }
    }

    #[test]
    fn bulk_decodes_once_per_chunk()
    {
        Host::with_config(torture(), |host| {
            let seq = Rc::new(CompactIntSeq::ascending(0, 130));
            let view = Integers::from_sexp(host, host.new_altrep::<i32>(seq)).unwrap();
            let before = host.stats().region_calls;

            let buffered: Vec<i32> = view.iter().map(Result::unwrap).collect();
            assert_eq!(host.stats().region_calls - before, 3);

            let indexed: Vec<i32> = (0 .. view.len()).map(|i| view.elt(i)).collect();
            assert_eq!(buffered, indexed);
            assert_eq!(buffered.len(), 130);
        });
    }

    #[test]
    fn direct_iteration_does_not_decode()
    {
        Host::with_config(torture(), |host| {
            let view = Integers::from_sexp(host, host.vector_from(&[4, 5, 6])).unwrap();
            let values: Vec<i32> = view.iter().map(Result::unwrap).collect();
            assert_eq!(values, [4, 5, 6]);
            assert_eq!(host.stats().region_calls, 0);
        });
    }

    #[test]
    fn decode_error_is_yielded_once()
    {
        Host::with_config(torture(), |host| {
            let faulty = Rc::new(Faulty{length: 100, fail_from: 80});
            let view = Integers::from_sexp(host, host.new_altrep::<i32>(faulty)).unwrap();
            let depth = host.protect_depth();

            let mut iter = view.iter();
            for expected in 0 .. 64 {
                assert_eq!(iter.next(), Some(Ok(expected)));
            }
            assert_eq!(
                iter.next(),
                Some(Err(Error::HostCondition("cannot decode from 64".to_owned()))),
            );
            assert_eq!(iter.next(), None);
            assert_eq!(host.protect_depth(), depth);
        });
    }

    proptest!
    {
        #[test]
        fn buffered_matches_indexed(start in -500i32 .. 500, length in 0usize .. 400)
        {
            Host::with_config(torture(), |host| {
                let seq = Rc::new(CompactIntSeq::descending(start, length));
                let view = Integers::from_sexp(host, host.new_altrep::<i32>(seq)).unwrap();
                let before = host.stats().region_calls;
                let buffered = view.to_vec().unwrap();
                let calls = host.stats().region_calls - before;
                assert_eq!(calls as usize, (length + CHUNK_SIZE - 1) / CHUNK_SIZE);
                for (index, value) in buffered.iter().enumerate() {
                    assert_eq!(*value, view.elt(index));
                }
            });
        }
    }
}
