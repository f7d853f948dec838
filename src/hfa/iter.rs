//! Iterators over the HFA entry tree.
//!
//! 1. [`ChildIter`] - the immediate children of one entry (`child`, then `next` links)
//! 2. [`TreeWalker`] - pre-order traversal of the whole tree with depth
//!
//! Both keep a set of visited offsets, so a corrupt file whose links form a
//! cycle ends in [`HfaError::CorruptTree`] instead of looping.
//!
//! # Example
//! ```no_run
//! # use hfa_reader::HfaReader;
//! # let reader = HfaReader::open("roads.ovr").unwrap();
//! for item in reader.walk() {
//!     let (depth, entry) = item.unwrap();
//!     println!("{}{} ({})", "  ".repeat(depth), entry.name, entry.type_name);
//! }
//! ```

use std::collections::HashSet;
use std::io::{Read, Seek};
use log::{trace, warn};

use super::reader::HfaReader;
use super::types::error::{HfaError, Result};
use super::types::models::Entry;

/// Iterator over the immediate children of an entry.
///
/// Created by [`HfaReader::children()`](crate::HfaReader::children).
pub struct ChildIter<'a, R> {
    reader: &'a HfaReader<R>,
    first: u32,
    next: u32,
    seen: HashSet<u64>,
    done: bool,
}

impl<'a, R: Read + Seek> ChildIter<'a, R> {
    pub(super) fn new(reader: &'a HfaReader<R>, parent: &Entry) -> Self {
        Self {
            reader,
            first: parent.child,
            next: parent.child,
            seen: HashSet::new(),
            done: false,
        }
    }

    /// Rewinds to the first child.
    pub fn restart(&mut self) {
        self.next = self.first;
        self.seen.clear();
        self.done = false;
    }
}

impl<'a, R: Read + Seek> Iterator for ChildIter<'a, R> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next == 0 {
            return None;
        }
        let offset = self.next as u64;
        if !self.seen.insert(offset) {
            self.done = true;
            return Some(Err(HfaError::CorruptTree { offset }));
        }
        match self.reader.entry(offset) {
            Ok(entry) => {
                self.next = entry.next;
                Some(Ok(entry))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Pre-order, child-before-sibling traversal of the entry tree.
///
/// Yields `Result<(depth, Entry)>` with the root at depth 0.
///
/// - An entry that cannot be read (offset outside the file, truncated header)
///   is reported once; its children and the siblings reachable only through
///   it are lost, and traversal resumes with the next pending entry.
/// - Revisiting an offset, or nesting deeper than the configured maximum,
///   yields [`HfaError::CorruptTree`] and ends the traversal.
///
/// Created by [`HfaReader::walk()`](crate::HfaReader::walk).
pub struct TreeWalker<'a, R> {
    reader: &'a HfaReader<R>,
    /// Pending `(offset, depth)` pairs; the top is visited next.
    stack: Vec<(u64, usize)>,
    visited: HashSet<u64>,
    max_depth: usize,
    fused: bool,
}

impl<'a, R: Read + Seek> TreeWalker<'a, R> {
    pub(super) fn new(reader: &'a HfaReader<R>, root: u64, max_depth: usize) -> Self {
        let stack = if root == 0 { Vec::new() } else { vec![(root, 0)] };
        Self {
            reader,
            stack,
            visited: HashSet::new(),
            max_depth,
            fused: false,
        }
    }

    /// Number of distinct entries visited so far.
    pub fn visited(&self) -> usize {
        self.visited.len()
    }

    fn fail(&mut self, error: HfaError) -> Option<Result<(usize, Entry)>> {
        self.fused = true;
        self.stack.clear();
        Some(Err(error))
    }
}

impl<'a, R: Read + Seek> Iterator for TreeWalker<'a, R> {
    type Item = Result<(usize, Entry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        let (offset, depth) = self.stack.pop()?;

        if depth > self.max_depth {
            warn!("Entry tree deeper than {} at {:#x}", self.max_depth, offset);
            return self.fail(HfaError::CorruptTree { offset });
        }
        if !self.visited.insert(offset) {
            warn!("Entry tree revisits {:#x}", offset);
            return self.fail(HfaError::CorruptTree { offset });
        }

        match self.reader.entry(offset) {
            Ok(entry) => {
                trace!("Visit {:#x} at depth {}: {}", offset, depth, entry.name);
                // Pushed in reverse: the child must come off the stack first.
                if entry.next != 0 {
                    self.stack.push((entry.next as u64, depth));
                }
                if entry.child != 0 {
                    self.stack.push((entry.child as u64, depth + 1));
                }
                Some(Ok((depth, entry)))
            }
            Err(e) if e.is_out_of_bounds() => {
                warn!("Skipping unreadable entry at {:#x}: {}", offset, e);
                Some(Err(e))
            }
            Err(e) => self.fail(e),
        }
    }
}
