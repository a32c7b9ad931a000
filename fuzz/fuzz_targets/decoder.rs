#![no_main]

use libfuzzer_sys::fuzz_target;
use dothook::{
    assembly::decode_body,
    hook::{HookCompiler, NamingOptions},
    metadata::{
        resolver::SymbolTable,
        routine::{Routine, RoutineBody, RoutineId},
        token::Token,
        typesystem::{GenericContext, TypeRef},
    },
};

fuzz_target!(|data: &[u8]| {
    let Ok(body) = RoutineBody::from_method_body(data, Vec::new()) else {
        return;
    };
    let symbols = SymbolTable::new();
    let Ok(list) = decode_body(
        &body.code,
        &body.exception_handlers,
        &symbols,
        &GenericContext::default(),
    ) else {
        return;
    };

    let routine = Routine::new(RoutineId(1), "Fuzz", TypeRef::class(Token(0x0200_0001), "Fuzz", "Target"))
        .with_body(body);
    let options = NamingOptions::default();
    let _ = HookCompiler::new(&routine, &list, &options).copy();
    let _ = HookCompiler::new(&routine, &list, &options).compile(&[], &[]);
});
