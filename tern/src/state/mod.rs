//! State masks: one snapshot of ternary knowledge per round boundary.
//!
//! A [`State`] is a fixed collection of [`Mask`]s, one per cipher word. The
//! word count and width are decided at construction, so a single type covers
//! the 5x64, 16x32 and smaller nibble-oriented shapes without virtual
//! dispatch.
//!
//! Words are held behind `Arc` and only copied on mutation, so cloning a
//! state for a search branch shares every word the branch never touches.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use crate::mask::Mask;

/// One bit position of a state that changed and must be re-examined by the
/// layers touching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdatePos {
    pub word: usize,
    pub bit: usize,
}

impl UpdatePos {
    pub fn new(word: usize, bit: usize) -> UpdatePos {
        UpdatePos { word, bit }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    words: Vec<Arc<Mask>>,
    bits_per_word: usize,
}

impl State {
    /// An all-unknown state of `words` words of `bits_per_word` bits each.
    pub fn unknown(words: usize, bits_per_word: usize) -> State {
        assert!(words >= 1, "A state needs at least one word");
        State {
            words: (0..words)
                .map(|_| Arc::new(Mask::unknown(bits_per_word)))
                .collect(),
            bits_per_word,
        }
    }

    #[inline]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn bits_per_word(&self) -> usize {
        self.bits_per_word
    }

    /// All bit positions where `self` and `other` disagree. The two states
    /// must have the same shape.
    pub fn diff(&self, other: &State) -> Vec<UpdatePos> {
        debug_assert_eq!(self.word_count(), other.word_count());
        debug_assert_eq!(self.bits_per_word, other.bits_per_word);

        let mut changed = Vec::new();
        for (w, (mine, theirs)) in self.words.iter().zip(other.words.iter()).enumerate() {
            // Words still shared between the snapshots cannot differ.
            if Arc::ptr_eq(mine, theirs) || mine == theirs {
                continue;
            }
            for b in 0..self.bits_per_word {
                if mine.bit(b) != theirs.bit(b) {
                    changed.push(UpdatePos::new(w, b));
                }
            }
        }
        changed
    }

    /// True if every word of the state is fully determined.
    pub fn is_determined(&self) -> bool {
        self.words.iter().all(|m| m.is_determined())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mask> {
        self.words.iter().map(|w| w.as_ref())
    }
}

impl Index<usize> for State {
    type Output = Mask;

    #[inline]
    fn index(&self, index: usize) -> &Mask {
        self.words[index].as_ref()
    }
}

impl IndexMut<usize> for State {
    /// Mutable access un-shares the word first (copy-on-write).
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Mask {
        Arc::make_mut(&mut self.words[index])
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for word in self.words.iter() {
            writeln!(f, "{}", word)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mask::Bit;

    #[test]
    fn diff_reports_changed_positions() {
        let mut a = State::unknown(3, 4);
        let b = a.clone();
        a[1].set_bit(2, Bit::One);
        a[2].set_bit(0, Bit::Zero);

        let changed = a.diff(&b);
        assert_eq!(changed, vec![UpdatePos::new(1, 2), UpdatePos::new(2, 0)]);
        assert!(b.diff(&b).is_empty());
    }

    #[test]
    fn clone_is_independent() {
        let mut a = State::unknown(2, 8);
        let b = a.clone();
        a[0].set_bit(5, Bit::One);
        assert_eq!(b[0].bit(5), Bit::Unknown);
    }
}
