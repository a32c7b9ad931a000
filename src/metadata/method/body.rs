//! Parsing and encoding of CIL method bodies.
//!
//! A method body is a tiny or fat header, followed by the code, followed (fat headers only) by
//! 4-byte aligned extra data sections holding the exception handling clauses.
//!
//! # Examples
//!
//! ```rust
//! use dothook::metadata::method::{encode_method_body, MethodBody};
//!
//! // ldc.i4.1; ret
//! let bytes = encode_method_body(&[0x17, 0x2A], 8, 0, false, &[])?;
//! assert_eq!(bytes, [0x0A, 0x17, 0x2A]);
//!
//! let body = MethodBody::from(&bytes)?;
//! assert!(!body.is_fat);
//! assert_eq!(body.code(&bytes), &[0x17, 0x2A]);
//! # Ok::<(), dothook::Error>(())
//! ```
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method Header Format

use crate::{
    file::io::{read_le, read_le_at, write_le_at},
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
    Error::OutOfRange,
    Result,
};

/// Size of a small exception clause in bytes
const SMALL_CLAUSE_SIZE: usize = 12;
/// Size of a fat exception clause in bytes
const FAT_CLAUSE_SIZE: usize = 24;
/// Largest code that still fits a tiny header
const TINY_MAX_CODE: usize = 0x3F;
/// Max stack implied by a tiny header
const TINY_MAX_STACK: u16 = 8;

/// Describes one method that has been compiled to CIL bytecode.
///
/// The `MethodBody` struct represents the parsed header of a method, its code size, stack
/// requirements, local variable signature, and exception handling regions.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Size of the method (length of all instructions, not counting the header) in bytes
    pub size_code: usize,
    /// Size of the method header in bytes
    pub size_header: usize,
    /// `MetaData` token for a signature describing the layout of the local variables for the method. 0 == no local variables
    pub local_var_sig_token: u32,
    /// Maximum number of items on the operand stack
    pub max_stack: usize,
    /// Flag, indicating the type of the method header
    pub is_fat: bool,
    /// Flag, indicating to call default constructor on all local variables
    pub is_init_local: bool,
    /// A list of exception handlers this method has
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Create a `MethodBody` object from a sequence of bytes.
    ///
    /// # Arguments
    /// * `data` - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the data is empty, out of bounds, or malformed.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_00000011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfRange);
                }

                Ok(MethodBody {
                    size_code,
                    size_header: 1,
                    local_var_sig_token: 0,
                    max_stack: usize::from(TINY_MAX_STACK),
                    is_fat: false,
                    is_init_local: false,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < 12 {
                    return Err(OutOfRange);
                }

                let first_duo = read_le::<u16>(data)?;
                let size_header = usize::from(first_duo >> 12) * 4;
                if size_header < 12 {
                    return Err(malformed_error!("Fat header size {} is too small", size_header));
                }

                let size_code = read_le::<u32>(&data[4..])? as usize;
                let end_of_code = size_header.checked_add(size_code).ok_or(OutOfRange)?;
                if data.len() < end_of_code {
                    return Err(OutOfRange);
                }

                let local_var_sig_token = read_le::<u32>(&data[8..])?;
                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000111111111111_u16);
                let max_stack = read_le::<u16>(&data[2..])? as usize;

                let exception_handlers = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    parse_sections(data, (end_of_code + 3) & !3)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    size_code,
                    size_header,
                    local_var_sig_token,
                    max_stack,
                    is_fat: true,
                    is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// Get the full size of this method, without extra data sections
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_code + self.size_header
    }

    /// Slice the code bytes out of the buffer this body was parsed from.
    ///
    /// Returns an empty slice if `data` is not the buffer this header came from.
    #[must_use]
    pub fn code<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        data.get(self.size_header..self.size()).unwrap_or(&[])
    }
}

// Exception Handling -> II.25.4.6
// The extra sections currently can only contain exception handling data
fn parse_sections(data: &[u8], mut cursor: usize) -> Result<Vec<ExceptionHandler>> {
    let mut exception_handlers = Vec::new();

    while data.len() >= cursor + 4 {
        let section_flags = SectionFlags::from_bits_truncate(data[cursor]);
        if !section_flags.contains(SectionFlags::EHTABLE) {
            break;
        }

        let section_start = cursor;
        if section_flags.contains(SectionFlags::FAT_FORMAT) {
            let section_size = (read_le::<u32>(&data[cursor..])? >> 8) as usize;
            if section_size < 4 || data.len() < cursor + section_size {
                return Err(malformed_error!(
                    "Fat exception section of {} bytes does not fit",
                    section_size
                ));
            }

            cursor += 4;
            for _ in 0..(section_size - 4) / FAT_CLAUSE_SIZE {
                exception_handlers.push(ExceptionHandler {
                    // Only the low 16 bits carry defined flags
                    #[allow(clippy::cast_possible_truncation)]
                    flags: ExceptionHandlerFlags::from_bits_truncate(
                        read_le_at::<u32>(data, &mut cursor)? as u16,
                    ),
                    try_offset: read_le_at::<u32>(data, &mut cursor)?,
                    try_length: read_le_at::<u32>(data, &mut cursor)?,
                    handler_offset: read_le_at::<u32>(data, &mut cursor)?,
                    handler_length: read_le_at::<u32>(data, &mut cursor)?,
                    filter_offset: read_le_at::<u32>(data, &mut cursor)?,
                });
            }
            cursor = section_start + section_size;
        } else {
            let section_size = usize::from(data[cursor + 1]);
            if section_size < 4 || data.len() < cursor + section_size {
                return Err(malformed_error!(
                    "Small exception section of {} bytes does not fit",
                    section_size
                ));
            }

            cursor += 4;
            for _ in 0..(section_size - 4) / SMALL_CLAUSE_SIZE {
                exception_handlers.push(ExceptionHandler {
                    flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                        data,
                        &mut cursor,
                    )?),
                    try_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                    try_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                    handler_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                    handler_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                    filter_offset: read_le_at::<u32>(data, &mut cursor)?,
                });
            }
            cursor = section_start + section_size;
        }

        if !section_flags.contains(SectionFlags::MORE_SECTS) {
            break;
        }
        cursor = (cursor + 3) & !3;
    }

    Ok(exception_handlers)
}

/// Encode a complete method body: header, code and exception section.
///
/// A tiny header is chosen when the body has no locals, no exception handlers, at most 63
/// bytes of code and needs no more than 8 stack slots. Everything else gets a fat header. The
/// exception section uses the small layout when every clause fits it.
///
/// # Arguments
/// * `code` - The CIL bytes
/// * `max_stack` - Maximum evaluation stack depth
/// * `local_var_sig_token` - Token of the locals signature, 0 for none
/// * `init_locals` - Whether locals are zero-initialized
/// * `handlers` - Exception clauses, inner clauses first
///
/// # Errors
/// Returns [`crate::Error::OutOfRange`] if the code is larger than a fat header can describe.
pub fn encode_method_body(
    code: &[u8],
    max_stack: u16,
    local_var_sig_token: u32,
    init_locals: bool,
    handlers: &[ExceptionHandler],
) -> Result<Vec<u8>> {
    let is_tiny = code.len() <= TINY_MAX_CODE
        && max_stack <= TINY_MAX_STACK
        && local_var_sig_token == 0
        && !init_locals
        && handlers.is_empty();

    if is_tiny {
        let mut bytes = Vec::with_capacity(code.len() + 1);
        // Bounded by TINY_MAX_CODE
        #[allow(clippy::cast_possible_truncation)]
        bytes.push(((code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
        bytes.extend_from_slice(code);
        return Ok(bytes);
    }

    let code_size = u32::try_from(code.len()).map_err(|_| OutOfRange)?;

    let mut flags = MethodBodyFlags::FAT_FORMAT;
    if init_locals {
        flags |= MethodBodyFlags::INIT_LOCALS;
    }
    if !handlers.is_empty() {
        flags |= MethodBodyFlags::MORE_SECTS;
    }

    let end_of_code = 12 + code.len();
    let aligned = (end_of_code + 3) & !3;
    let mut bytes = vec![0_u8; aligned];

    let mut offset = 0;
    write_le_at(&mut bytes, &mut offset, flags.bits() | (3 << 12))?;
    write_le_at(&mut bytes, &mut offset, max_stack)?;
    write_le_at(&mut bytes, &mut offset, code_size)?;
    write_le_at(&mut bytes, &mut offset, local_var_sig_token)?;
    bytes[offset..end_of_code].copy_from_slice(code);

    if !handlers.is_empty() {
        encode_exception_section(&mut bytes, handlers)?;
    }

    Ok(bytes)
}

// Sizes checked below, clause fields checked by fits_small
#[allow(clippy::cast_possible_truncation)]
fn encode_exception_section(bytes: &mut Vec<u8>, handlers: &[ExceptionHandler]) -> Result<()> {
    let small_size = 4 + handlers.len() * SMALL_CLAUSE_SIZE;
    let use_small = small_size <= 0xFF && handlers.iter().all(ExceptionHandler::fits_small);

    let section_size = if use_small {
        small_size
    } else {
        4 + handlers.len() * FAT_CLAUSE_SIZE
    };
    if section_size > 0x00FF_FFFF {
        return Err(OutOfRange);
    }

    let start = bytes.len();
    bytes.resize(start + section_size, 0);
    let mut offset = start;

    if use_small {
        write_le_at(bytes, &mut offset, SectionFlags::EHTABLE.bits())?;
        write_le_at(bytes, &mut offset, section_size as u8)?;
        write_le_at(bytes, &mut offset, 0_u16)?;
        for handler in handlers {
            write_le_at(bytes, &mut offset, handler.flags.bits())?;
            write_le_at(bytes, &mut offset, handler.try_offset as u16)?;
            write_le_at(bytes, &mut offset, handler.try_length as u8)?;
            write_le_at(bytes, &mut offset, handler.handler_offset as u16)?;
            write_le_at(bytes, &mut offset, handler.handler_length as u8)?;
            write_le_at(bytes, &mut offset, handler.filter_offset)?;
        }
    } else {
        let kind = (SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits();
        write_le_at(bytes, &mut offset, u32::from(kind) | ((section_size as u32) << 8))?;
        for handler in handlers {
            write_le_at(bytes, &mut offset, u32::from(handler.flags.bits()))?;
            write_le_at(bytes, &mut offset, handler.try_offset)?;
            write_le_at(bytes, &mut offset, handler.try_length)?;
            write_le_at(bytes, &mut offset, handler.handler_offset)?;
            write_le_at(bytes, &mut offset, handler.handler_length)?;
            write_le_at(bytes, &mut offset, handler.filter_offset)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    #[test]
    fn tiny() {
        // ldarg.0; ldarg.1; add; ret
        let data = [0x12, 0x02, 0x03, 0x58, 0x2A];

        let method_header = MethodBody::from(&data).unwrap();

        assert!(!method_header.is_fat);
        assert!(!method_header.is_init_local);
        assert!(method_header.exception_handlers.is_empty());
        assert_eq!(method_header.max_stack, 8);
        assert_eq!(method_header.size_code, 4);
        assert_eq!(method_header.size_header, 1);
        assert_eq!(method_header.size(), 5);
        assert_eq!(method_header.local_var_sig_token, 0);
        assert_eq!(method_header.code(&data), &[0x02, 0x03, 0x58, 0x2A]);
    }

    #[test]
    fn tiny_truncated() {
        let data = [0x12, 0x02, 0x03];
        assert!(matches!(MethodBody::from(&data), Err(OutOfRange)));
    }

    #[test]
    fn fat() {
        #[rustfmt::skip]
        let data = [
            0x13, 0x30, 0x05, 0x00,  // flags: fat, init locals, header size 3 dwords, max stack 5
            0x02, 0x00, 0x00, 0x00,  // code size
            0x59, 0x00, 0x00, 0x11,  // local var sig token
            0x06, 0x2A,
        ];

        let method_header = MethodBody::from(&data).unwrap();

        assert!(method_header.is_fat);
        assert!(method_header.is_init_local);
        assert!(method_header.exception_handlers.is_empty());
        assert_eq!(method_header.max_stack, 5);
        assert_eq!(method_header.size_code, 2);
        assert_eq!(method_header.size_header, 12);
        assert_eq!(method_header.size(), 14);
        assert_eq!(method_header.local_var_sig_token, 0x1100_0059);
        assert_eq!(method_header.code(&data), &[0x06, 0x2A]);
    }

    #[test]
    fn fat_small_exception_section() {
        #[rustfmt::skip]
        let data = [
            0x1B, 0x30, 0x01, 0x00,  // fat, init locals, more sections
            0x06, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x11,
            0x00, 0xDE, 0x02, 0x26, 0xDE, 0x00,  // nop; leave.s; pop; leave.s
            0x00, 0x00,              // padding
            0x01, 0x10, 0x00, 0x00,  // small EH section, 16 bytes
            0x00, 0x00, 0x00, 0x00, 0x03, 0x03, 0x00, 0x02, 0x05, 0x00, 0x00, 0x01,
        ];

        let method_header = MethodBody::from(&data).unwrap();
        assert_eq!(method_header.exception_handlers.len(), 1);

        let handler = &method_header.exception_handlers[0];
        assert!(handler.is_catch());
        assert_eq!(handler.try_offset, 0);
        assert_eq!(handler.try_length, 3);
        assert_eq!(handler.handler_offset, 3);
        assert_eq!(handler.handler_length, 2);
        assert_eq!(handler.class_token(), Some(Token(0x0100_0005)));
    }

    #[test]
    fn fat_exception_section_overflow() {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x01, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x2A, 0x00, 0x00, 0x00,
            0x41, 0x40, 0x00, 0x00,  // fat EH section claiming 64 bytes
            0x02, 0x00, 0x00, 0x00,
        ];

        assert!(matches!(
            MethodBody::from(&data),
            Err(crate::Error::MalformedBody { .. })
        ));
    }

    #[test]
    fn neither_tiny_nor_fat() {
        assert!(MethodBody::from(&[0x00, 0x2A]).is_err());
        assert!(MethodBody::from(&[]).is_err());
    }

    #[test]
    fn encode_tiny() {
        let bytes = encode_method_body(&[0x02, 0x2A], 1, 0, false, &[]).unwrap();
        assert_eq!(bytes, [0x0A, 0x02, 0x2A]);
    }

    #[test]
    fn encode_fat_when_locals() {
        let bytes = encode_method_body(&[0x06, 0x2A], 2, 0x1100_0001, true, &[]).unwrap();
        let body = MethodBody::from(&bytes).unwrap();

        assert!(body.is_fat);
        assert!(body.is_init_local);
        assert_eq!(body.max_stack, 2);
        assert_eq!(body.local_var_sig_token, 0x1100_0001);
        assert_eq!(body.code(&bytes), &[0x06, 0x2A]);
    }

    #[test]
    fn encode_large_code_is_fat() {
        let code = vec![0x00; 64];
        let bytes = encode_method_body(&code, 0, 0, false, &[]).unwrap();
        let body = MethodBody::from(&bytes).unwrap();
        assert!(body.is_fat);
        assert_eq!(body.size_code, 64);
    }

    #[test]
    fn encode_exception_sections() {
        let code = vec![0x00; 20];
        let small = vec![
            ExceptionHandler::catch(0, 4, 4, 2, Token(0x0100_0002)),
            ExceptionHandler::finally(0, 8, 8, 4),
        ];
        let bytes = encode_method_body(&code, 2, 0, false, &small).unwrap();
        assert_eq!(MethodBody::from(&bytes).unwrap().exception_handlers, small);

        let fat = vec![ExceptionHandler::filter(0, 0x300, 0x300, 0x310, 0x120)];
        let code = vec![0x00; 0x500];
        let bytes = encode_method_body(&code, 2, 0, false, &fat).unwrap();
        let section = (12 + code.len() + 3) & !3;
        assert_eq!(bytes[section], 0x41);
        assert_eq!(MethodBody::from(&bytes).unwrap().exception_handlers, fat);
    }
}
