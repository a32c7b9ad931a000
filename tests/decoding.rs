//! Decoding against the opcode tables and complete method bodies.

use dothook::{
    assembly::{
        decode_body, decode_instruction, ExceptionMarker, Operand, OperandType, INSTRUCTIONS,
        INSTRUCTIONS_FE,
    },
    metadata::{
        method::{encode_method_body, ExceptionHandler},
        resolver::SymbolTable,
        routine::RoutineBody,
        token::Token,
        typesystem::{GenericContext, TypeShape},
    },
    Error, Parser,
};

fn zero_operand(prefix: Option<u8>, opcode: u8, op_type: OperandType) -> Vec<u8> {
    let mut bytes: Vec<u8> = prefix.into_iter().chain([opcode]).collect();
    match op_type.size() {
        Some(size) => bytes.resize(bytes.len() + size, 0),
        // empty switch table
        None => bytes.extend_from_slice(&[0, 0, 0, 0]),
    }
    bytes
}

#[test]
fn every_opcode_decodes() {
    let single = INSTRUCTIONS
        .iter()
        .enumerate()
        .map(|(opcode, entry)| (None, opcode, entry));
    let double = INSTRUCTIONS_FE
        .iter()
        .enumerate()
        .map(|(opcode, entry)| (Some(0xFE), opcode, entry));

    let mut decoded = 0;
    for (prefix, opcode, entry) in single.chain(double) {
        // 0xFE itself is the prefix byte of the second table
        if entry.instr.is_empty() || (prefix.is_none() && opcode == 0xFE) {
            continue;
        }
        let opcode = u8::try_from(opcode).unwrap();
        let bytes = zero_operand(prefix, opcode, entry.op_type);

        let mut parser = Parser::new(&bytes);
        let instruction = decode_instruction(&mut parser)
            .unwrap_or_else(|e| panic!("{} failed to decode: {e}", entry.instr));
        assert_eq!(instruction.mnemonic, entry.instr);
        assert_eq!(instruction.size as usize, bytes.len(), "{}", entry.instr);
        assert_eq!(instruction.opcode, opcode);
        decoded += 1;
    }
    assert!(decoded > 200);
}

#[test]
fn reserved_and_truncated() {
    for bytes in [&[0xA6][..], &[0xFE, 0x08], &[0xFE], &[0x20, 0x01], &[0x45, 0x02, 0, 0, 0, 0]] {
        let mut parser = Parser::new(bytes);
        assert!(decode_instruction(&mut parser).is_err(), "{bytes:02X?}");
    }
}

#[test]
fn branch_offsets_become_indices() {
    // IL_0000: ldarg.0
    // IL_0001: switch (IL_0010, IL_000e)
    // IL_000e: ldc.i4.1
    // IL_000f: ret
    // IL_0010: ldc.i4.0
    // IL_0011: ret
    let code = [
        0x02, 0x45, 0x02, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x17,
        0x2A, 0x16, 0x2A,
    ];
    let list = decode_body(&code, &[], &SymbolTable::new(), &GenericContext::default()).unwrap();

    assert_eq!(list.len(), 6);
    assert_eq!(list[1].operand, Operand::BranchTable(vec![4, 2]));
    assert_eq!(list.branch_targets(), vec![2, 4]);
    assert_eq!(list.code_size(), 18);
}

#[test]
fn branch_into_an_instruction_is_malformed() {
    // br.s +1 lands inside ldc.i4.s
    let code = [0x2B, 0x01, 0x1F, 0x05, 0x2A];
    let result = decode_body(&code, &[], &SymbolTable::new(), &GenericContext::default());
    assert!(matches!(result, Err(Error::MalformedBody { .. })));
}

#[test]
fn unknown_tokens_are_reported() {
    // ldstr 0x70000001; ret
    let code = [0x72, 0x01, 0x00, 0x00, 0x70, 0x2A];
    let symbols = SymbolTable::new();
    let result = decode_body(&code, &[], &symbols, &GenericContext::default());
    assert!(matches!(result, Err(Error::UnresolvedToken(Token(0x7000_0001)))));

    symbols.insert_string(Token(0x7000_0001), "hello");
    let list = decode_body(&code, &[], &symbols, &GenericContext::default()).unwrap();
    assert_eq!(list[0].operand, Operand::String("hello".to_string()));
}

#[test]
fn fat_body_markers() {
    // IL_0000: nop
    // IL_0001: leave.s IL_0005
    // IL_0003: nop
    // IL_0004: endfinally
    // IL_0005: ret
    let code = [0x00, 0xDE, 0x02, 0x00, 0xDC, 0x2A];
    let handlers = [ExceptionHandler::finally(0, 3, 3, 2)];
    let image = encode_method_body(&code, 1, 0, false, &handlers).unwrap();

    let body = RoutineBody::from_method_body(&image, Vec::new()).unwrap();
    assert_eq!(body.code, code);
    assert_eq!(body.exception_handlers, handlers);

    let list = decode_body(
        &body.code,
        &body.exception_handlers,
        &SymbolTable::new(),
        &GenericContext::default(),
    )
    .unwrap();
    assert_eq!(list[0].markers, vec![ExceptionMarker::BeginTry]);
    assert_eq!(list[2].markers, vec![ExceptionMarker::BeginFinally]);
    assert_eq!(list[4].markers, vec![ExceptionMarker::EndTry]);
    assert!(list.tail_markers().is_empty());
    assert_eq!(list.region_balance(), 0);
}

#[test]
fn region_ending_at_the_body_end() {
    // IL_0000: nop
    // IL_0001: leave.s IL_0006
    // IL_0003: pop
    // IL_0004: leave.s IL_0006
    // IL_0006: ret, last instruction of the handler
    let code = [0x00, 0xDE, 0x03, 0x26, 0xDE, 0x00, 0x2A];
    let catch_token = Token(0x0100_0001);
    let symbols = SymbolTable::new();
    symbols.insert_type(catch_token, TypeShape::Object);

    let handlers = [ExceptionHandler::catch(0, 3, 3, 4, catch_token)];
    let list = decode_body(&code, &handlers, &symbols, &GenericContext::default()).unwrap();

    assert_eq!(
        list[2].markers,
        vec![ExceptionMarker::BeginCatch(TypeShape::Object)]
    );
    assert_eq!(list.tail_markers(), &[ExceptionMarker::EndTry]);
}

#[test]
fn misaligned_clause_is_malformed() {
    let code = [0x1F, 0x05, 0x26, 0x2A];
    let handlers = [ExceptionHandler::finally(1, 2, 3, 1)];
    let result = decode_body(&code, &handlers, &SymbolTable::new(), &GenericContext::default());
    assert!(matches!(result, Err(Error::MalformedBody { .. })));
}
