//! The two protection registries.
//!
//! Objects referenced from the protect stack or the precious set
//! are roots for the collector. The protect stack is cheap but strictly
//! LIFO; the precious set is order-independent. Both are bounded.

use crate::sexp::Id;

/// Entry on the protect stack.
///
/// Releasing must happen in exact reverse order of acquisition.
#[derive(Debug, Eq, PartialEq)]
#[must_use = "a protect stack entry must be released exactly once"]
pub struct StackSlot
{
    depth: usize,
}

impl StackSlot
{
    /// Position of the entry, counted from the bottom of the stack.
    pub fn depth(&self) -> usize
    {
        self.depth
    }
}

/// Entry in the precious set.
#[derive(Debug, Eq, PartialEq)]
#[must_use = "a precious set entry must be released exactly once"]
pub struct PreserveKey
{
    index: u32,
    generation: u32,
}

pub (crate) struct ProtectStack
{
    entries: Vec<Id>,
    limit: usize,
}

impl ProtectStack
{
    pub fn new(limit: usize) -> Self
    {
        Self{entries: Vec::new(), limit}
    }

    pub fn depth(&self) -> usize
    {
        self.entries.len()
    }

    pub fn headroom(&self) -> usize
    {
        self.limit - self.entries.len()
    }

    /// Push an entry; [`None`] when the stack is full.
    pub fn push(&mut self, id: Id) -> Option<StackSlot>
    {
        if self.entries.len() == self.limit {
            return None;
        }
        let depth = self.entries.len();
        self.entries.push(id);
        Some(StackSlot{depth})
    }

    /// Pop the entry, which must be the topmost one.
    pub fn pop(&mut self, slot: StackSlot) -> Option<Id>
    {
        if slot.depth + 1 != self.entries.len() {
            return None;
        }
        self.entries.pop()
    }

    /// Replace the object of an entry in place, returning the old object.
    pub fn replace(&mut self, slot: &StackSlot, id: Id) -> Option<Id>
    {
        let entry = self.entries.get_mut(slot.depth)?;
        Some(std::mem::replace(entry, id))
    }

    /// Remove every entry at or above `depth`.
    pub fn truncate(&mut self, depth: usize) -> Vec<Id>
    {
        if depth >= self.entries.len() {
            return Vec::new();
        }
        self.entries.split_off(depth)
    }

    pub fn iter(&self) -> impl Iterator<Item=Id> + '_
    {
        self.entries.iter().copied()
    }
}

struct PreciousSlot
{
    generation: u32,
    id: Option<Id>,
}

pub (crate) struct PreciousSet
{
    slots: Vec<PreciousSlot>,
    free: Vec<u32>,
    len: usize,
    limit: usize,
}

impl PreciousSet
{
    pub fn new(limit: usize) -> Self
    {
        Self{slots: Vec::new(), free: Vec::new(), len: 0, limit}
    }

    pub fn len(&self) -> usize
    {
        self.len
    }

    pub fn headroom(&self) -> usize
    {
        self.limit - self.len
    }

    /// Insert an entry; [`None`] when the set is full.
    pub fn insert(&mut self, id: Id) -> Option<PreserveKey>
    {
        if self.len == self.limit {
            return None;
        }
        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.id = Some(id);
                PreserveKey{index, generation: slot.generation}
            },
            None => {
                let index = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(PreciousSlot{generation: 0, id: Some(id)});
                PreserveKey{index, generation: 0}
            },
        };
        self.len += 1;
        Some(key)
    }

    /// Remove an entry by key; [`None`] if the key is stale.
    pub fn remove(&mut self, key: PreserveKey) -> Option<Id>
    {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let id = slot.id.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(id)
    }

    pub fn iter(&self) -> impl Iterator<Item=Id> + '_
    {
        self.slots.iter().filter_map(|slot| slot.id)
    }
}
