//! Shared fixtures for the integration tests.
#![allow(dead_code)]

pub mod interpreter;
pub mod runtime;

use dothook::{
    engine::Engine,
    hook::{Hook, HookRc},
    metadata::{
        members::{FieldRef, MethodRef},
        routine::{Parameter, Routine, RoutineBody, RoutineId},
        signatures::SignatureMethod,
        token::Token,
        typesystem::{TypeRef, TypeShape},
    },
    patch::{PatchConfig, SandboxMemory},
};

pub use interpreter::{cell, Machine, Value};
pub use runtime::{FakeRuntime, PROLOGUE};

pub type TestEngine = Engine<FakeRuntime, SandboxMemory>;

pub const ADD: RoutineId = RoutineId(1);
pub const TALLY: RoutineId = RoutineId(2);
pub const BUMP: RoutineId = RoutineId(3);
pub const INCREMENT: RoutineId = RoutineId(4);
pub const ABSTRACT: RoutineId = RoutineId(5);
pub const DOUBLE_ADD: RoutineId = RoutineId(6);

pub fn calc() -> TypeRef {
    TypeRef::class(Token(0x0200_0002), "Demo", "Calc")
}

pub fn counter() -> TypeRef {
    TypeRef::class(Token(0x0200_0003), "Demo", "Counter")
}

pub fn hooks() -> TypeRef {
    TypeRef::class(Token(0x0200_0010), "Demo", "Hooks")
}

pub fn total_field() -> FieldRef {
    FieldRef {
        token: Token(0x0400_0001),
        owner: calc(),
        name: "total".to_string(),
        shape: TypeShape::I4,
        is_static: true,
    }
}

pub fn count_field() -> FieldRef {
    FieldRef {
        token: Token(0x0400_0002),
        owner: counter(),
        name: "count".to_string(),
        shape: TypeShape::I4,
        is_static: false,
    }
}

/// `static int Add(int a, int b) => a + b;`
pub fn add() -> Routine {
    Routine::new(ADD, "Add", calc())
        .with_token(Token(0x0600_0001))
        .returning(TypeShape::I4)
        .with_params(vec![
            Parameter::new("a", TypeShape::I4),
            Parameter::new("b", TypeShape::I4),
        ])
        .with_fields(vec![total_field()])
        .with_body(RoutineBody::new(vec![0x02, 0x03, 0x58, 0x2A]))
}

/// `static int Tally(int amount) { total += amount; return total; }`
pub fn tally() -> Routine {
    #[rustfmt::skip]
    let code = vec![
        0x7E, 0x01, 0x00, 0x00, 0x04, // ldsfld total
        0x02,                         // ldarg.0
        0x58,                         // add
        0x80, 0x01, 0x00, 0x00, 0x04, // stsfld total
        0x7E, 0x01, 0x00, 0x00, 0x04, // ldsfld total
        0x2A,                         // ret
    ];
    Routine::new(TALLY, "Tally", calc())
        .with_token(Token(0x0600_0002))
        .returning(TypeShape::I4)
        .with_params(vec![Parameter::new("amount", TypeShape::I4)])
        .with_fields(vec![total_field()])
        .with_body(RoutineBody::new(code))
}

/// `static void Bump(ref int value) { value += 1; }`
pub fn bump() -> Routine {
    #[rustfmt::skip]
    let code = vec![
        0x02,       // ldarg.0
        0x02,       // ldarg.0
        0x4A,       // ldind.i4
        0x17,       // ldc.i4.1
        0x58,       // add
        0x54,       // stind.i4
        0x2A,       // ret
    ];
    Routine::new(BUMP, "Bump", calc())
        .with_token(Token(0x0600_0003))
        .with_params(vec![Parameter::new("value", TypeShape::I4.by_ref())])
        .with_body(RoutineBody::new(code))
}

/// `int Increment() { count += 1; return count; }` on `Demo.Counter`
pub fn increment() -> Routine {
    #[rustfmt::skip]
    let code = vec![
        0x02,                         // ldarg.0
        0x02,                         // ldarg.0
        0x7B, 0x02, 0x00, 0x00, 0x04, // ldfld count
        0x17,                         // ldc.i4.1
        0x58,                         // add
        0x7D, 0x02, 0x00, 0x00, 0x04, // stfld count
        0x02,                         // ldarg.0
        0x7B, 0x02, 0x00, 0x00, 0x04, // ldfld count
        0x2A,                         // ret
    ];
    Routine::new(INCREMENT, "Increment", counter())
        .with_token(Token(0x0600_0004))
        .instance()
        .returning(TypeShape::I4)
        .with_fields(vec![count_field()])
        .with_body(RoutineBody::new(code))
}

/// An abstract method
pub fn abstract_routine() -> Routine {
    Routine::new(ABSTRACT, "Evaluate", calc())
        .with_token(Token(0x0600_0005))
        .returning(TypeShape::I4)
}

/// `static int DoubleAdd(int a, int b) => Add(a, b) * 2;`
pub fn double_add() -> Routine {
    #[rustfmt::skip]
    let code = vec![
        0x02,                         // ldarg.0
        0x03,                         // ldarg.1
        0x28, 0x01, 0x00, 0x00, 0x06, // call Add
        0x18,                         // ldc.i4.2
        0x5A,                         // mul
        0x2A,                         // ret
    ];
    Routine::new(DOUBLE_ADD, "DoubleAdd", calc())
        .with_token(Token(0x0600_0006))
        .returning(TypeShape::I4)
        .with_params(vec![
            Parameter::new("a", TypeShape::I4),
            Parameter::new("b", TypeShape::I4),
        ])
        .with_body(RoutineBody::new(code))
}

/// A static method on `Demo.Hooks`
pub fn hook_method(row: u32, name: &str, returns: TypeShape, params: Vec<TypeShape>) -> MethodRef {
    MethodRef::new(
        Token(0x0600_0100 + row),
        hooks(),
        name,
        SignatureMethod::new_static(returns, params),
    )
}

/// Register `method` as a native of `engine`'s runtime and describe it as a hook
pub fn native_hook(
    engine: &mut TestEngine,
    method: MethodRef,
    names: &[&str],
    native: impl Fn(&mut [Value]) -> Value + 'static,
) -> HookRc {
    engine.host_mut().add_native(&method, native);
    Hook::new(method, names).expect("hook names match").shared()
}

/// An engine over every fixture routine
pub fn engine(config: PatchConfig) -> TestEngine {
    let routines = vec![add(), tally(), bump(), increment(), abstract_routine(), double_add()];

    let mut runtime = FakeRuntime::new();
    let mut memory = SandboxMemory::new(0x1000);
    for routine in &routines {
        runtime.add_routine(routine, &mut memory);
    }

    let mut engine = Engine::new(runtime, memory, config);
    for routine in routines {
        engine.register(routine);
    }
    engine
}

/// Call `id` through its entry point
pub fn invoke(engine: &TestEngine, id: RoutineId, args: Vec<Value>) -> Option<Value> {
    Machine::new(engine.host(), engine.applier().memory()).invoke(id, args)
}

pub fn entry_bytes(engine: &TestEngine, id: RoutineId) -> Vec<u8> {
    use dothook::patch::ExecutableMemory;

    let entry = engine.host().entry(id);
    engine
        .applier()
        .memory()
        .read_bytes(entry, PROLOGUE.len())
        .expect("entry is mapped")
}
