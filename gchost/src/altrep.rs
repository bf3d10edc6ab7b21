//! Vectors backed by an abstract representation.
//!
//! An altrep object has no contiguous buffer of elements.
//! Instead it delegates element access to a class object,
//! which may compute elements on the fly, decompress them,
//! or fetch them from somewhere else entirely.
//! Reading many elements one at a time through the class is slow,
//! so the class also offers bulk reads through [`Altrep::get_region`].

/// Behavior of an abstract-backed vector.
pub trait Altrep<T>
{
    /// Name of the class, used in diagnostics.
    fn class_name(&self) -> &str;

    /// Number of elements.
    fn length(&self) -> usize;

    /// Compute a single element.
    ///
    /// The host checks bounds before calling this.
    fn elt(&self, index: usize) -> T;

    /// Copy elements starting at `start` into `buf`.
    ///
    /// Returns the number of elements copied, which is the smaller of
    /// the buffer length and the number of remaining elements.
    /// An error message is raised by the host as a condition.
    fn get_region(&self, start: usize, buf: &mut [T]) -> Result<usize, String>
    {
        let count = buf.len().min(self.length().saturating_sub(start));
        for (offset, slot) in buf[.. count].iter_mut().enumerate() {
            *slot = self.elt(start + offset);
        }
        Ok(count)
    }
}

/// Compact representation of an arithmetic integer sequence.
///
/// Stores only the first element, the length, and the direction.
#[derive(Clone, Copy, Debug)]
pub struct CompactIntSeq
{
    start: i32,
    length: usize,
    step: i32,
}

impl CompactIntSeq
{
    /// The sequence `start, start + 1, ..., start + length - 1`.
    pub fn ascending(start: i32, length: usize) -> Self
    {
        Self{start, length, step: 1}
    }

    /// The sequence `start, start - 1, ..., start - length + 1`.
    pub fn descending(start: i32, length: usize) -> Self
    {
        Self{start, length, step: -1}
    }
}

impl Altrep<i32> for CompactIntSeq
{
    fn class_name(&self) -> &str
    {
        "compact_intseq"
    }

    fn length(&self) -> usize
    {
        self.length
    }

    fn elt(&self, index: usize) -> i32
    {
        // Wrapping mirrors what the host would store for huge sequences.
        self.start.wrapping_add(self.step.wrapping_mul(index as i32))
    }

    fn get_region(&self, start: usize, buf: &mut [i32]) -> Result<usize, String>
    {
        let count = buf.len().min(self.length.saturating_sub(start));
        let mut value = self.elt(start);
        for slot in &mut buf[.. count] {
            *slot = value;
            value = value.wrapping_add(self.step);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest};

    proptest!
    {
        #[test]
        fn region_matches_elt(
            start in -1000i32 .. 1000,
            length in 0usize .. 300,
            from in 0usize .. 300,
            size in 0usize .. 100,
        )
        {
            let seq = CompactIntSeq::descending(start, length);
            let mut buf = vec![0; size];
            let count = seq.get_region(from, &mut buf).unwrap();
            assert_eq!(count, size.min(length.saturating_sub(from)));
            for (offset, value) in buf[.. count].iter().enumerate() {
                assert_eq!(*value, seq.elt(from + offset));
            }
        }
    }
}
