//! Benchmarks for instruction decoding.
//!
//! - Single instructions of several operand shapes
//! - Complete bodies with branches, a switch and exception clauses

extern crate dothook;

use criterion::{criterion_group, criterion_main, Criterion};
use dothook::{
    assembly::{decode_body, decode_instruction},
    metadata::{method::ExceptionHandler, resolver::SymbolTable, typesystem::GenericContext},
    Parser,
};
use std::hint::black_box;

/// Benchmark decoding a one-byte instruction.
fn bench_decode_nop(c: &mut Criterion) {
    let code = [0x00];

    c.bench_function("decode_nop", |b| {
        b.iter(|| {
            let mut parser = Parser::new(black_box(&code));
            black_box(decode_instruction(&mut parser).unwrap())
        });
    });
}

/// Benchmark decoding a two-byte opcode with a 16-bit operand.
/// `ldarg 0x0102`
fn bench_decode_two_byte(c: &mut Criterion) {
    let code = [0xFE, 0x09, 0x02, 0x01];

    c.bench_function("decode_ldarg_long", |b| {
        b.iter(|| {
            let mut parser = Parser::new(black_box(&code));
            black_box(decode_instruction(&mut parser).unwrap())
        });
    });
}

/// Benchmark decoding a switch with 16 targets.
fn bench_decode_switch(c: &mut Criterion) {
    let mut code = vec![0x45, 0x10, 0x00, 0x00, 0x00];
    for target in 0..16_i32 {
        code.extend_from_slice(&target.to_le_bytes());
    }

    c.bench_function("decode_switch_16", |b| {
        b.iter(|| {
            let mut parser = Parser::new(black_box(&code));
            black_box(decode_instruction(&mut parser).unwrap())
        });
    });
}

/// Benchmark decoding a loop body with a long backward branch.
fn bench_decode_loop_body(c: &mut Criterion) {
    let code = [
        0x16, 0x0A, 0x02, 0x2C, 0x0F, 0x06, 0x02, 0x58, 0x0A, 0x02, 0x17, 0x59, 0x10, 0x00,
        0x02, 0x3A, 0xF1, 0xFF, 0xFF, 0xFF, 0x06, 0x2A,
    ];
    let symbols = SymbolTable::new();
    let context = GenericContext::default();

    c.bench_function("decode_body_loop", |b| {
        b.iter(|| black_box(decode_body(black_box(&code), &[], &symbols, &context).unwrap()));
    });
}

/// Benchmark decoding a large straight-line body with nested try/finally regions.
fn bench_decode_regions(c: &mut Criterion) {
    // 1000 nops, leave.s IL_03ee, endfinally, leave.s IL_03ee, endfinally, ret
    let mut code = vec![0x00; 1000];
    code.extend_from_slice(&[0xDE, 0x04, 0xDC, 0xDE, 0x01, 0xDC, 0x2A]);
    let handlers = [
        ExceptionHandler::finally(10, 992, 1002, 1),
        ExceptionHandler::finally(0, 1003, 1003, 3),
    ];
    let symbols = SymbolTable::new();
    let context = GenericContext::default();

    c.bench_function("decode_body_regions", |b| {
        b.iter(|| {
            black_box(decode_body(black_box(&code), &handlers, &symbols, &context).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_decode_nop,
    bench_decode_two_byte,
    bench_decode_switch,
    bench_decode_loop_body,
    bench_decode_regions,
);
criterion_main!(benches);
