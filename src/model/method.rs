//! Method bodies and the balanced in-place replacement primitives.
//!
//! A [`Method`] owns an ordered instruction sequence. Handlers never splice that
//! sequence directly: they go through [`Method::replace`] and [`Method::replace_range`],
//! which compare the net stack effect of the replaced window with that of the
//! replacement and refuse, atomically, any edit that would leave the method unbalanced.

use std::ops::Range;

use crate::{model::instruction::Instruction, Error, Result};

/// Returns the net stack effect of an instruction window.
///
/// # Examples
///
/// ```rust
/// use cilshim::model::{window_effect, Instruction};
///
/// let window = [Instruction::ldstr(0, "a"), Instruction::other(1, "pop", 1, 0)];
/// assert_eq!(window_effect(&window), 0);
/// ```
#[must_use]
pub fn window_effect(instructions: &[Instruction]) -> i32 {
    instructions
        .iter()
        .map(|i| i.stack_behavior().net_effect())
        .sum()
}

/// A method with a mutable instruction body, owned by its module.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    name: String,
    instructions: Vec<Instruction>,
}

impl Method {
    /// Creates a method from its full name and body.
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Method {
            name: name.into(),
            instructions,
        }
    }

    /// Returns the full name of the method.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the instruction sequence.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the instruction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Replaces one instruction with another of identical net stack effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackImbalance`] if the net effects differ and
    /// [`Error::WindowOutOfBounds`] if `index` does not exist. The method is unchanged
    /// on error.
    pub fn replace(&mut self, index: usize, instruction: Instruction) -> Result<()> {
        self.replace_range(index..index + 1, vec![instruction])
    }

    /// Replaces the window `range` with `replacement`, which may be of different length.
    ///
    /// This is the general form of [`Method::replace`], used when a symbol swap needs a
    /// different number of argument-loading or conversion instructions around the call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackImbalance`] if the replacement's net stack effect differs
    /// from the window's, and [`Error::WindowOutOfBounds`] for an invalid range. Either
    /// way the method body is left untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cilshim::model::{Instruction, Method};
    ///
    /// let mut method = Method::new(
    ///     "System.Void Mod::Entry()",
    ///     vec![Instruction::ldstr(0, "x"), Instruction::other(5, "pop", 1, 0)],
    /// );
    ///
    /// // a window of delta +1 cannot become a window of delta +2
    /// let bad = vec![Instruction::ldstr(0, "x"), Instruction::ldnull(0)];
    /// assert!(method.replace_range(0..1, bad).is_err());
    /// assert_eq!(method.len(), 2);
    ///
    /// // but it can become two instructions of total delta +1
    /// let good = vec![
    ///     Instruction::ldstr(0, "x"),
    ///     Instruction::ldnull(0),
    ///     Instruction::other(0, "pop", 1, 0),
    /// ];
    /// method.replace_range(0..1, good).unwrap();
    /// assert_eq!(method.len(), 4);
    /// ```
    pub fn replace_range(
        &mut self,
        range: Range<usize>,
        replacement: Vec<Instruction>,
    ) -> Result<()> {
        if range.start > range.end || range.end > self.instructions.len() {
            return Err(Error::WindowOutOfBounds {
                method: self.name.clone(),
                start: range.start,
                end: range.end,
                len: self.instructions.len(),
            });
        }

        let before = window_effect(&self.instructions[range.clone()]);
        let after = window_effect(&replacement);
        if before != after {
            let offset = self
                .instructions
                .get(range.start)
                .map_or(0, |instruction| instruction.offset);
            return Err(Error::StackImbalance {
                method: self.name.clone(),
                offset,
                before,
                after,
            });
        }

        self.instructions.splice(range, replacement);
        Ok(())
    }
}
