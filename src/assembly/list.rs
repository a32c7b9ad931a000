//! The decoded form of a method body.
//!
//! An [`InstructionList`] keeps instructions in offset order. Offsets are unique and strictly
//! increasing, so lookup by offset is a binary search and the previous/next instruction is the
//! neighboring index.

use std::{fmt, ops::Index};

use crate::assembly::instruction::{ExceptionMarker, Instruction};

/// Instructions of one method body, in offset order.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionList {
    instructions: Vec<Instruction>,
    tail_markers: Vec<ExceptionMarker>,
    code_size: u32,
}

impl InstructionList {
    /// Build a list from instructions already sorted by offset.
    ///
    /// # Arguments
    /// * `instructions` - Decoded instructions, in offset order
    /// * `tail_markers` - Markers placed after the last instruction
    /// * `code_size` - Size of the decoded code in bytes
    #[must_use]
    pub fn new(
        instructions: Vec<Instruction>,
        tail_markers: Vec<ExceptionMarker>,
        code_size: u32,
    ) -> Self {
        InstructionList {
            instructions,
            tail_markers,
            code_size,
        }
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the body has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Size of the decoded code in bytes
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.code_size
    }

    /// Instruction at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Iterate in offset order
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// The last instruction
    #[must_use]
    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// The instructions as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Index of the instruction starting at `offset`
    #[must_use]
    pub fn index_of_offset(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |instruction| instruction.offset)
            .ok()
    }

    /// The instruction starting at `offset`
    #[must_use]
    pub fn find_by_offset(&self, offset: u32) -> Option<&Instruction> {
        self.index_of_offset(offset)
            .map(|index| &self.instructions[index])
    }

    /// The instruction before `index`
    #[must_use]
    pub fn prev(&self, index: usize) -> Option<&Instruction> {
        index.checked_sub(1).and_then(|i| self.instructions.get(i))
    }

    /// The instruction after `index`
    #[must_use]
    pub fn next(&self, index: usize) -> Option<&Instruction> {
        index.checked_add(1).and_then(|i| self.instructions.get(i))
    }

    /// Markers of regions ending exactly at the end of the body
    #[must_use]
    pub fn tail_markers(&self) -> &[ExceptionMarker] {
        &self.tail_markers
    }

    /// `BeginTry` count minus `EndTry` count, zero for well-formed bodies
    #[must_use]
    pub fn region_balance(&self) -> isize {
        self.instructions
            .iter()
            .flat_map(|instruction| instruction.markers.iter())
            .chain(self.tail_markers.iter())
            .map(|marker| match marker {
                ExceptionMarker::BeginTry => 1,
                ExceptionMarker::EndTry => -1,
                _ => 0,
            })
            .sum()
    }

    /// Indices of instructions that some branch or switch targets
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        let mut targets: Vec<usize> = self
            .instructions
            .iter()
            .flat_map(Instruction::branch_targets)
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }
}

impl Index<usize> for InstructionList {
    type Output = Instruction;

    fn index(&self, index: usize) -> &Self::Output {
        &self.instructions[index]
    }
}

impl<'a> IntoIterator for &'a InstructionList {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn write_markers(
    f: &mut fmt::Formatter<'_>,
    markers: &[ExceptionMarker],
    depth: &mut usize,
) -> fmt::Result {
    for marker in markers {
        match marker {
            ExceptionMarker::EndTry => {
                *depth = depth.saturating_sub(1);
                writeln!(f, "{}}}", indent(*depth))?;
            }
            ExceptionMarker::BeginTry => {
                writeln!(f, "{}{marker}", indent(*depth))?;
                *depth += 1;
            }
            _ => writeln!(f, "{}}} {marker}", indent(depth.saturating_sub(1)))?,
        }
    }
    Ok(())
}

/// Disassembly listing, one line per instruction, region markers on their own lines
impl fmt::Display for InstructionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0usize;
        for instruction in &self.instructions {
            write_markers(f, &instruction.markers, &mut depth)?;
            writeln!(f, "{}{instruction}", indent(depth))?;
        }
        write_markers(f, &self.tail_markers, &mut depth)
    }
}
