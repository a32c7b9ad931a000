//! A small CIL interpreter over decoded instruction lists.
//!
//! Enough of the instruction set to run the bodies the tests build and the code the hook
//! compiler emits. Calls to registered routines go through their native entry point, so a
//! jump stub written by the patch applier is followed to the loaded replacement.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use dothook::{
    assembly::{decode_body, Immediate, Instruction, InstructionList, Operand},
    metadata::{
        members::{MemberRef, MethodRef},
        method::ExceptionHandler,
        routine::{Routine, RoutineId},
        typesystem::TypeShape,
    },
    patch::{follow_jump, ExecutableMemory, SandboxMemory},
};

use super::runtime::FakeRuntime;

/// Storage of one argument, local, static field or array slot
pub type Cell = Rc<RefCell<Value>>;

pub fn cell(value: Value) -> Cell {
    Rc::new(RefCell::new(value))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    I4(i32),
    I8(i64),
    R8(f64),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<Object>),
    Ref(Cell),
    Token(MemberRef),
    Method(String),
}

#[derive(Debug, PartialEq)]
pub struct Object {
    pub type_name: String,
    pub fields: RefCell<HashMap<String, Cell>>,
}

impl Value {
    pub fn object(type_name: &str, fields: &[(&str, Value)]) -> Value {
        let fields = fields
            .iter()
            .map(|(name, value)| (name.to_string(), cell(value.clone())))
            .collect();
        Value::Object(Rc::new(Object {
            type_name: type_name.to_string(),
            fields: RefCell::new(fields),
        }))
    }

    pub fn i4(&self) -> i32 {
        match self {
            Value::I4(value) => *value,
            Value::Ref(target) => target.borrow().i4(),
            other => panic!("expected int32, found {other:?}"),
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Value::Null => false,
            Value::I4(value) => *value != 0,
            Value::I8(value) => *value != 0,
            Value::R8(value) => *value != 0.0,
            _ => true,
        }
    }

    /// Read through a reference
    pub fn load(&self) -> Value {
        match self {
            Value::Ref(target) => target.borrow().clone(),
            other => panic!("expected a reference, found {other:?}"),
        }
    }

    /// Write through a reference
    pub fn store(&self, value: Value) {
        match self {
            Value::Ref(target) => *target.borrow_mut() = value,
            other => panic!("expected a reference, found {other:?}"),
        }
    }

    pub fn elements(&self) -> Vec<Value> {
        match self {
            Value::Array(elements) => elements.borrow().clone(),
            other => panic!("expected an array, found {other:?}"),
        }
    }

    pub fn set_element(&self, index: usize, value: Value) {
        match self {
            Value::Array(elements) => elements.borrow_mut()[index] = value,
            other => panic!("expected an array, found {other:?}"),
        }
    }

    pub fn field(&self, name: &str) -> Cell {
        match self {
            Value::Object(object) => object
                .fields
                .borrow_mut()
                .entry(name.to_string())
                .or_insert_with(|| cell(Value::Null))
                .clone(),
            other => panic!("expected an object, found {other:?}"),
        }
    }
}

/// Zero value of a local or field of `shape`
pub fn default_for(shape: &TypeShape) -> Value {
    match shape {
        TypeShape::I8 | TypeShape::U8 => Value::I8(0),
        TypeShape::R4 | TypeShape::R8 => Value::R8(0.0),
        shape if shape.is_value_type() => Value::I4(0),
        _ => Value::Null,
    }
}

/// Decode the target of a jump stub at `address`, if there is one
pub fn stub_target(memory: &SandboxMemory, address: usize) -> Option<usize> {
    if let Ok(bytes) = memory.read_bytes(address, 12) {
        if bytes[..2] == [0x48, 0xB8] && bytes[10..] == [0xFF, 0xE0] {
            let mut imm = [0u8; 8];
            imm.copy_from_slice(&bytes[2..10]);
            return Some(u64::from_le_bytes(imm) as usize);
        }
    }
    if let Ok(bytes) = memory.read_bytes(address, 6) {
        if bytes[0] == 0x68 && bytes[5] == 0xC3 {
            let mut imm = [0u8; 4];
            imm.copy_from_slice(&bytes[1..5]);
            return Some(u32::from_le_bytes(imm) as usize);
        }
    }
    None
}

pub struct Machine<'a> {
    runtime: &'a FakeRuntime,
    memory: &'a SandboxMemory,
}

/// Finally handlers still to run before a `leave` reaches its target
struct PendingLeave {
    handlers: Vec<usize>,
    target: usize,
}

impl<'a> Machine<'a> {
    pub fn new(runtime: &'a FakeRuntime, memory: &'a SandboxMemory) -> Self {
        Machine { runtime, memory }
    }

    /// Call a registered routine the way a call site would
    pub fn invoke(&self, id: RoutineId, args: Vec<Value>) -> Option<Value> {
        self.dispatch(self.runtime.routine(id), args)
    }

    fn dispatch(&self, routine: &Routine, args: Vec<Value>) -> Option<Value> {
        let entry = self.runtime.entry(routine.id);
        let address = follow_jump(self.memory, entry).expect("entry is mapped");

        if let Some(target) = stub_target(self.memory, address) {
            let compiled = self
                .runtime
                .loaded(target)
                .expect("stub jumps into loaded code");
            let list = compiled.decode().expect("compiled code decodes");
            return self.execute(&list, &compiled.exception_handlers, &compiled.locals, args);
        }

        let body = routine.body.as_ref().expect("routine has a body");
        let list = decode_body(
            &body.code,
            &body.exception_handlers,
            &self.runtime.symbols,
            &routine.generic_context,
        )
        .expect("original decodes");
        self.execute(&list, &body.exception_handlers, &body.locals, args)
    }

    /// Run decoded code with the given arguments
    pub fn execute(
        &self,
        list: &InstructionList,
        handlers: &[ExceptionHandler],
        locals: &[TypeShape],
        args: Vec<Value>,
    ) -> Option<Value> {
        let args: Vec<Cell> = args.into_iter().map(cell).collect();
        let locals: Vec<Cell> = locals.iter().map(|shape| cell(default_for(shape))).collect();
        let mut stack: Vec<Value> = Vec::new();
        let mut leaves: Vec<PendingLeave> = Vec::new();
        let mut pc = 0;

        loop {
            let instruction = &list[pc];
            let mut next = pc + 1;
            let mnemonic = instruction.mnemonic;

            match mnemonic {
                "nop" => {}
                "ret" => return stack.pop(),
                "pop" => {
                    stack.pop();
                }
                "dup" => {
                    let top = stack.last().cloned().expect("dup on empty stack");
                    stack.push(top);
                }
                "ldnull" => stack.push(Value::Null),
                m if m.starts_with("ldarga") => {
                    stack.push(Value::Ref(args[slot(instruction)].clone()))
                }
                m if m.starts_with("ldarg") => {
                    stack.push(args[slot(instruction)].borrow().clone())
                }
                m if m.starts_with("starg") => {
                    *args[slot(instruction)].borrow_mut() = pop(&mut stack)
                }
                m if m.starts_with("ldloca") => {
                    stack.push(Value::Ref(locals[slot(instruction)].clone()))
                }
                m if m.starts_with("ldloc") => {
                    stack.push(locals[slot(instruction)].borrow().clone())
                }
                m if m.starts_with("stloc") => {
                    *locals[slot(instruction)].borrow_mut() = pop(&mut stack)
                }
                m if m.starts_with("ldc.") => stack.push(constant(instruction)),
                "add" | "sub" | "mul" | "div" | "rem" => {
                    let right = pop(&mut stack);
                    let left = pop(&mut stack);
                    stack.push(arithmetic(mnemonic, &left, &right));
                }
                "neg" => {
                    let value = pop(&mut stack);
                    stack.push(arithmetic("sub", &Value::I4(0), &value));
                }
                "ceq" | "cgt" | "clt" => {
                    let right = pop(&mut stack);
                    let left = pop(&mut stack);
                    let holds = compare(mnemonic.trim_start_matches('c'), &left, &right);
                    stack.push(Value::I4(i32::from(holds)));
                }
                m if m.starts_with("conv.") => {
                    let value = pop(&mut stack);
                    stack.push(convert(m, &value));
                }
                "br" | "br.s" => next = branch(instruction),
                "brfalse" | "brfalse.s" => {
                    if !pop(&mut stack).is_true() {
                        next = branch(instruction);
                    }
                }
                "brtrue" | "brtrue.s" => {
                    if pop(&mut stack).is_true() {
                        next = branch(instruction);
                    }
                }
                "beq" | "beq.s" | "bne.un" | "bne.un.s" | "bgt" | "bgt.s" | "blt" | "blt.s"
                | "bge" | "bge.s" | "ble" | "ble.s" => {
                    let right = pop(&mut stack);
                    let left = pop(&mut stack);
                    let condition = mnemonic.trim_start_matches('b').trim_end_matches(".s");
                    if compare(condition, &left, &right) {
                        next = branch(instruction);
                    }
                }
                "switch" => {
                    let Operand::BranchTable(targets) = &instruction.operand else {
                        panic!("switch without table");
                    };
                    let selector = pop(&mut stack).i4();
                    if let Some(target) = usize::try_from(selector)
                        .ok()
                        .and_then(|index| targets.get(index))
                    {
                        next = *target;
                    }
                }
                "leave" | "leave.s" => {
                    stack.clear();
                    let target = branch(instruction);
                    let from = instruction.offset;
                    let to = list[target].offset;

                    let mut finallies: Vec<&ExceptionHandler> = handlers
                        .iter()
                        .filter(|clause| {
                            clause.is_finally()
                                && covers(clause, from)
                                && !covers(clause, to)
                        })
                        .collect();
                    finallies.sort_by_key(|clause| clause.try_length);

                    let mut pending: Vec<usize> = finallies
                        .iter()
                        .map(|clause| {
                            list.index_of_offset(clause.handler_offset)
                                .expect("handler starts on an instruction")
                        })
                        .collect();
                    if pending.is_empty() {
                        next = target;
                    } else {
                        next = pending.remove(0);
                        leaves.push(PendingLeave {
                            handlers: pending,
                            target,
                        });
                    }
                }
                "endfinally" => {
                    let mut leave = leaves.pop().expect("endfinally outside a leave");
                    if leave.handlers.is_empty() {
                        next = leave.target;
                    } else {
                        next = leave.handlers.remove(0);
                        leaves.push(leave);
                    }
                }
                "ldstr" => {
                    let Operand::String(value) = &instruction.operand else {
                        panic!("ldstr without string");
                    };
                    stack.push(Value::Str(value.clone()));
                }
                "newarr" => {
                    let count = pop(&mut stack).i4();
                    let count = usize::try_from(count).expect("non-negative array length");
                    stack.push(Value::Array(Rc::new(RefCell::new(vec![Value::Null; count]))));
                }
                "stelem.ref" => {
                    let value = pop(&mut stack);
                    let index = pop(&mut stack).i4() as usize;
                    pop(&mut stack).set_element(index, value);
                }
                "ldelem.ref" => {
                    let index = pop(&mut stack).i4() as usize;
                    let array = pop(&mut stack);
                    stack.push(array.elements()[index].clone());
                }
                "ldlen" => {
                    let length = pop(&mut stack).elements().len();
                    stack.push(Value::I4(length as i32));
                }
                // values are not boxed in this machine
                "box" | "unbox.any" | "castclass" => {}
                m if m.starts_with("ldind.") || m == "ldobj" => {
                    let address = pop(&mut stack);
                    stack.push(address.load());
                }
                m if m.starts_with("stind.") || m == "stobj" => {
                    let value = pop(&mut stack);
                    pop(&mut stack).store(value);
                }
                "initobj" => pop(&mut stack).store(Value::I4(0)),
                "ldsfld" | "ldsflda" | "stsfld" => {
                    let field = member(instruction)
                        .as_field()
                        .expect("static field operand");
                    let storage = self.runtime.static_cell(field);
                    match mnemonic {
                        "ldsfld" => stack.push(storage.borrow().clone()),
                        "ldsflda" => stack.push(Value::Ref(storage)),
                        _ => *storage.borrow_mut() = pop(&mut stack),
                    }
                }
                "ldfld" | "ldflda" => {
                    let field = member(instruction).as_field().expect("field operand");
                    let storage = pop(&mut stack).field(&field.name);
                    if mnemonic == "ldfld" {
                        stack.push(storage.borrow().clone());
                    } else {
                        stack.push(Value::Ref(storage));
                    }
                }
                "stfld" => {
                    let field = member(instruction).as_field().expect("field operand");
                    let value = pop(&mut stack);
                    *pop(&mut stack).field(&field.name).borrow_mut() = value;
                }
                "ldtoken" => stack.push(Value::Token(member(instruction).clone())),
                "call" | "callvirt" => {
                    let method = member(instruction).as_method().expect("method operand");
                    self.call(method, &mut stack);
                }
                other => panic!("unsupported instruction {other} at IL_{:04x}", instruction.offset),
            }

            pc = next;
        }
    }

    fn call(&self, method: &MethodRef, stack: &mut Vec<Value>) {
        let signature = &method.signature;
        let count = signature.params.len() + usize::from(signature.has_this);
        let mut args = stack.split_off(stack.len() - count);

        if method.name == "GetMethodFromHandle" {
            match &args[0] {
                Value::Token(MemberRef::Method(original)) => {
                    stack.push(Value::Method(original.full_name()));
                }
                other => panic!("expected a method handle, found {other:?}"),
            }
            return;
        }

        let result = if let Some(native) = self.runtime.native(method.token) {
            Some(native(&mut args))
        } else if let Some(routine) = self.runtime.routine_by_token(method.token) {
            self.dispatch(routine, args)
        } else {
            panic!("no implementation for {}", method.full_name());
        };

        if !signature.return_type.is_void() {
            stack.push(result.expect("non-void call returns a value"));
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> Value {
    stack.pop().expect("stack underflow")
}

fn covers(clause: &ExceptionHandler, offset: u32) -> bool {
    offset >= clause.try_offset && offset < clause.try_offset + clause.try_length
}

fn member(instruction: &Instruction) -> &MemberRef {
    instruction
        .operand
        .as_member()
        .unwrap_or_else(|| panic!("{} without member operand", instruction.mnemonic))
}

fn slot(instruction: &Instruction) -> usize {
    match &instruction.operand {
        Operand::Argument(index) | Operand::Local(index) => usize::from(*index),
        _ => instruction
            .mnemonic
            .rsplit('.')
            .next()
            .and_then(|suffix| suffix.parse().ok())
            .unwrap_or_else(|| panic!("no slot in {}", instruction.mnemonic)),
    }
}

fn branch(instruction: &Instruction) -> usize {
    match &instruction.operand {
        Operand::Branch(target) => *target,
        other => panic!("{} without branch target: {other:?}", instruction.mnemonic),
    }
}

fn constant(instruction: &Instruction) -> Value {
    match (instruction.mnemonic, instruction.operand.as_immediate()) {
        ("ldc.i4.m1", _) => Value::I4(-1),
        (_, Some(Immediate::Int8(value))) => Value::I4(i32::from(value)),
        (_, Some(Immediate::Int32(value))) => Value::I4(value),
        (_, Some(Immediate::Int64(value))) => Value::I8(value),
        (_, Some(Immediate::Float32(value))) => Value::R8(f64::from(value)),
        (_, Some(Immediate::Float64(value))) => Value::R8(value),
        (mnemonic, _) => Value::I4(
            mnemonic
                .rsplit('.')
                .next()
                .and_then(|suffix| suffix.parse().ok())
                .unwrap_or_else(|| panic!("unsupported constant {mnemonic}")),
        ),
    }
}

fn arithmetic(operation: &str, left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::I4(l), Value::I4(r)) => Value::I4(match operation {
            "add" => l.wrapping_add(*r),
            "sub" => l.wrapping_sub(*r),
            "mul" => l.wrapping_mul(*r),
            "div" => l / r,
            _ => l % r,
        }),
        (Value::I8(l), Value::I8(r)) => Value::I8(match operation {
            "add" => l.wrapping_add(*r),
            "sub" => l.wrapping_sub(*r),
            "mul" => l.wrapping_mul(*r),
            "div" => l / r,
            _ => l % r,
        }),
        (Value::R8(l), Value::R8(r)) => Value::R8(match operation {
            "add" => l + r,
            "sub" => l - r,
            "mul" => l * r,
            "div" => l / r,
            _ => l % r,
        }),
        _ => panic!("{operation} on {left:?} and {right:?}"),
    }
}

fn compare(condition: &str, left: &Value, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::I4(l), Value::I4(r)) => l.partial_cmp(r),
        (Value::I8(l), Value::I8(r)) => l.partial_cmp(r),
        (Value::R8(l), Value::R8(r)) => l.partial_cmp(r),
        _ => return matches!(condition, "eq") == (left == right),
    };
    let ordering = ordering.expect("comparable values");
    match condition {
        "eq" => ordering.is_eq(),
        "ne.un" => ordering.is_ne(),
        "gt" => ordering.is_gt(),
        "lt" => ordering.is_lt(),
        "ge" => ordering.is_ge(),
        "le" => ordering.is_le(),
        other => panic!("unknown comparison {other}"),
    }
}

fn convert(mnemonic: &str, value: &Value) -> Value {
    let wide = match value {
        Value::I4(v) => f64::from(*v),
        Value::I8(v) => *v as f64,
        Value::R8(v) => *v,
        other => panic!("{mnemonic} on {other:?}"),
    };
    match mnemonic {
        "conv.i8" | "conv.u8" => match value {
            Value::I4(v) => Value::I8(i64::from(*v)),
            Value::I8(v) => Value::I8(*v),
            _ => Value::I8(wide as i64),
        },
        "conv.r4" | "conv.r8" | "conv.r.un" => Value::R8(wide),
        _ => Value::I4(wide as i32),
    }
}
