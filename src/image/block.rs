/// Scoped mutable view of a block

use crate::image::BlockStorage;
use std::ops::{Deref, DerefMut};

/// Editable copy of one block, seeded from its current content
///
/// Writing through the view and then dropping it is what marks the block
/// dirty in the owning storage. A view that was only read leaves the block
/// untouched.
#[derive(Debug)]
pub struct BlockMut<'a> {
    storage: &'a mut BlockStorage,
    index: usize,
    data: Vec<u8>,
    modified: bool,
}

impl<'a> BlockMut<'a> {
    pub(crate) fn new(storage: &'a mut BlockStorage, index: usize, data: Vec<u8>) -> Self {
        Self {
            storage,
            index,
            data,
            modified: false,
        }
    }

    /// Block index this view belongs to
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the view has been written through
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Drop the view without marking the block, discarding any edits
    pub fn discard(mut self) {
        self.modified = false;
    }
}

impl Deref for BlockMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for BlockMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.modified = true;
        &mut self.data
    }
}

impl Drop for BlockMut<'_> {
    fn drop(&mut self) {
        if self.modified {
            let data = std::mem::take(&mut self.data);
            self.storage.stage_block(self.index, data);
        }
    }
}
