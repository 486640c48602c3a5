//! Scratch cache distinguishing borrowed base blocks from owned merge output.

use std::sync::Arc;

use lamina_common::Result;

use crate::block::ColumnBlock;

#[derive(Debug)]
enum HeldBlock {
    /// A shared base block, referenced without copying. Dropping the
    /// reference never frees the block unless it was the last one.
    Borrowed(Arc<ColumnBlock>),
    /// A freshly materialized block held exclusively, reusable across calls.
    Owned(ColumnBlock),
}

/// Single-slot block cache owned by one scan at a time.
///
/// Block materialization either installs a borrowed reference to an
/// untouched base block or merges into an owned block. The owned allocation
/// survives across calls and is reused whenever it is large enough, so a
/// scan over many blocks materializes into one allocation instead of one
/// per block.
#[derive(Debug, Default)]
pub struct ColumnBlockHolder {
    held: Option<HeldBlock>,
}

impl ColumnBlockHolder {
    pub fn new() -> ColumnBlockHolder {
        ColumnBlockHolder::default()
    }

    /// Installs a borrowed reference to a shared block, replacing whatever
    /// was held before.
    pub fn init_borrowed(&mut self, block: Arc<ColumnBlock>) {
        self.held = Some(HeldBlock::Borrowed(block));
    }

    /// Installs an owned block, replacing whatever was held before.
    pub fn init_owned(&mut self, block: ColumnBlock) {
        self.held = Some(HeldBlock::Owned(block));
    }

    /// The held block.
    ///
    /// # Panics
    ///
    /// Panics when nothing has been installed.
    pub fn get(&self) -> &ColumnBlock {
        match self.held.as_ref() {
            Some(HeldBlock::Borrowed(block)) => block,
            Some(HeldBlock::Owned(block)) => block,
            None => panic!("empty column block holder"),
        }
    }

    /// Whether a block is currently installed.
    pub fn is_init(&self) -> bool {
        self.held.is_some()
    }

    /// Whether the holder owns its block and may reuse its allocation.
    pub fn is_owned(&self) -> bool {
        matches!(self.held, Some(HeldBlock::Owned(_)))
    }

    /// Drops the held reference. An owned block is freed; a borrowed one
    /// merely loses this reference.
    pub fn release(&mut self) {
        self.held = None;
    }

    /// Makes the holder own a block with room for `nrows` values of `esize`
    /// bytes each, reusing the currently owned block when it is large
    /// enough and allocating a fresh one otherwise.
    pub fn ensure_owned(&mut self, nrows: usize, esize: usize) -> Result<&mut ColumnBlock> {
        let reusable = matches!(
            self.held.as_ref(),
            Some(HeldBlock::Owned(block))
                if block.size() >= nrows && block.data().len() >= nrows * esize
        );
        if !reusable {
            let mut block = ColumnBlock::new();
            block.alloc(nrows, esize)?;
            self.held = Some(HeldBlock::Owned(block));
        }
        match self.held.as_mut() {
            Some(HeldBlock::Owned(block)) => Ok(block),
            _ => unreachable!(),
        }
    }
}
