//! Absolute jump stubs and jump following.

use crate::{
    file::io::read_le,
    patch::{memory::ExecutableMemory, PointerWidth},
    Error, Result,
};

/// `jmp rel32`
pub const JMP_REL32: u8 = 0xE9;
/// `mov rax, imm64`
const MOV_RAX_IMM64: [u8; 2] = [0x48, 0xB8];
/// `jmp rax`
const JMP_RAX: [u8; 2] = [0xFF, 0xE0];
/// `push imm32`
const PUSH_IMM32: u8 = 0x68;
/// `ret`
const RET: u8 = 0xC3;

/// Build the absolute jump to `target` for the given pointer width.
///
/// ```text
/// x64: 48 B8 <imm64> FF E0    mov rax, target; jmp rax
/// x86: 68 <imm32> C3          push target; ret
/// ```
///
/// # Errors
/// Returns [`crate::Error::OutOfRange`] if `target` does not fit a 32-bit stub.
///
/// # Examples
///
/// ```rust
/// use dothook::patch::{jump_stub, PointerWidth};
///
/// let stub = jump_stub(PointerWidth::Bits32, 0x1234_5678)?;
/// assert_eq!(stub, [0x68, 0x78, 0x56, 0x34, 0x12, 0xC3]);
/// # Ok::<(), dothook::Error>(())
/// ```
pub fn jump_stub(width: PointerWidth, target: usize) -> Result<Vec<u8>> {
    let mut stub = Vec::with_capacity(width.stub_len());
    match width {
        PointerWidth::Bits64 => {
            stub.extend_from_slice(&MOV_RAX_IMM64);
            stub.extend_from_slice(&(target as u64).to_le_bytes());
            stub.extend_from_slice(&JMP_RAX);
        }
        PointerWidth::Bits32 => {
            let target = u32::try_from(target).map_err(|_| Error::OutOfRange)?;
            stub.push(PUSH_IMM32);
            stub.extend_from_slice(&target.to_le_bytes());
            stub.push(RET);
        }
    }

    Ok(stub)
}

/// Resolve where code at `address` really starts.
///
/// If the entry begins with `jmp rel32` the jump target is returned, otherwise `address`
/// itself. Only the first jump is followed.
///
/// # Errors
/// Returns [`crate::Error::OutOfRange`] if the entry bytes cannot be read.
pub fn follow_jump<M: ExecutableMemory + ?Sized>(memory: &M, address: usize) -> Result<usize> {
    let opcode = memory.read_bytes(address, 1)?;
    if opcode.first() != Some(&JMP_REL32) {
        return Ok(address);
    }

    let displacement = memory.read_bytes(address.wrapping_add(1), 4)?;
    let rel = read_le::<i32>(&displacement)?;
    Ok(address.wrapping_add(5).wrapping_add_signed(rel as isize))
}
