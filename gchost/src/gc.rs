//! Mark-sweep collector.

use {
    crate::{Host, object::Flags, sexp::Id},
    tracing::debug,
};

impl<'h> Host<'h>
{
    /// Reclaim every object that is not reachable from a root.
    ///
    /// Roots are the protect stack, the precious set, the globals,
    /// and the host's singletons. Returns the number of reclaimed objects.
    pub fn gc(&self) -> usize
    {
        let (reclaimed, live) = {
            let mut state = self.state.borrow_mut();
            let mut pending: Vec<Id> =
                [self.nil, self.na_string, self.blank_string].into_iter()
                .chain(state.stack.iter())
                .chain(state.precious.iter())
                .chain(state.globals.values().copied())
                .collect();

            while let Some(id) = pending.pop() {
                let Some(object) = state.get_mut(id) else { continue };
                if object.flags.contains(Flags::MARK) {
                    continue;
                }
                object.flags.insert(Flags::MARK);
                object.for_each_child(|child| pending.push(child));
            }

            let reclaimed = state.sweep();
            (reclaimed, state.live())
        };

        self.bump(|stats| {
            stats.collections += 1;
            stats.reclaimed += reclaimed as u64;
        });
        debug!(reclaimed, live, "collection finished");
        reclaimed
    }
}
