use std::cell::RefCell;
use std::rc::Rc;

use lunette_bytecode::{Chunk, UndumpError};

use super::helpers::*;

/// Main function with `_ENV` as its single in-stack upvalue.
fn main_proto(code: Vec<Instruction>, constants: Vec<Constant>) -> Proto {
    let mut p = proto_with_constants(code, constants);
    p.source = Some("@test.lua".into());
    p.is_vararg = 1;
    p.upvalues = vec![upval(true, 0)];
    p.debug.upvalue_names = vec!["_ENV".into()];
    p
}

fn reload(chunk: &Chunk) -> Chunk {
    lunette_vm::load(&chunk.dump()).unwrap_or_else(|e| panic!("reload failed: {e}"))
}

#[test]
fn test_global_read_after_reload() {
    let chunk = reload(&Chunk::new(main_proto(
        vec![
            iabc(OpCode::VarArgPrep, 0, 0, 0),
            iabc(OpCode::GetTabUp, 0, 0, 0),
            iabc(OpCode::Return1, 0, 0, 0),
        ],
        vec![Constant::String("answer".into())],
    )));
    assert_eq!(chunk.upvalue_count, 1);
    assert_eq!(chunk.main.source_name(), "@test.lua");

    let mut env = Table::new();
    env.set(LuaValue::string("answer"), LuaValue::Integer(42)).unwrap();

    let mut vm = Vm::new();
    let results = vm.execute_chunk(&chunk, LuaValue::from(env)).unwrap();
    assert_int(&results, 0, 42);
}

#[test]
fn test_global_write_visible_to_host() {
    let chunk = reload(&Chunk::new(main_proto(
        vec![
            iabck(OpCode::SetTabUp, 0, 0, 1),
            iabc(OpCode::Return0, 0, 0, 0),
        ],
        vec![Constant::String("greeting".into()), Constant::String("hello".into())],
    )));
    let env = LuaValue::new_table();
    let globals = env.as_table().cloned().unwrap();

    let mut vm = Vm::new();
    assert!(vm.execute_chunk(&chunk, env).unwrap().is_empty());
    assert_eq!(globals.borrow().get_str("greeting"), LuaValue::string("hello"));
}

#[test]
fn test_native_print_receives_arguments() {
    let chunk = reload(&Chunk::new(main_proto(
        vec![
            iabc(OpCode::GetTabUp, 0, 0, 0),
            iabx(OpCode::LoadK, 1, 1),
            iasbx(OpCode::LoadI, 2, 3),
            iabc(OpCode::Call, 0, 3, 0),
            iabc(OpCode::Return0, 0, 0, 0),
        ],
        vec![Constant::String("print".into()), Constant::String("hi".into())],
    )));

    let printed = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&printed);
    let mut env = Table::new();
    env.set(
        LuaValue::string("print"),
        LuaValue::Native(NativeFunction::new("print", move |args| {
            let line: Vec<String> = args.iter().map(ToString::to_string).collect();
            sink.borrow_mut().push(line.join("\t"));
            Ok(Vec::new())
        })),
    )
    .unwrap();

    let mut vm = Vm::new();
    vm.execute_chunk(&chunk, LuaValue::from(env)).unwrap();
    assert_eq!(*printed.borrow(), vec!["hi\t3".to_string()]);
}

#[test]
fn test_nested_closures_survive_reload() {
    let mut counter = proto(vec![
        iabc(OpCode::GetUpval, 0, 0, 0),
        iabc(OpCode::AddI, 0, 0, 1),
        iabc(OpCode::SetUpval, 0, 0, 0),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    counter.upvalues = vec![upval(true, 0)];
    counter.source = Some("@test.lua".into());
    counter.debug.upvalue_names = vec!["n".into()];
    counter.line_defined = 2;
    counter.last_line_defined = 4;

    let mut main = main_proto(
        vec![
            iasbx(OpCode::LoadI, 0, 10),
            iabx(OpCode::Closure, 1, 0),
            iasbx(OpCode::LoadI, 2, 4),
            iabx(OpCode::ForPrep, 2, 2),
            iabc(OpCode::Move, 3, 1, 0),
            iabc(OpCode::Call, 3, 1, 0),
            iabx(OpCode::ForLoop, 2, 3),
            iabc(OpCode::Return1, 0, 0, 0),
        ],
        Vec::new(),
    );
    main.protos = vec![counter];
    let original = Chunk::new(main);
    let chunk = reload(&original);
    assert_eq!(chunk, original);
    assert_eq!(chunk.main.protos[0].source_name(), "@test.lua");

    let mut vm = Vm::new();
    let results = vm.execute_chunk(&chunk, LuaValue::new_table()).unwrap();
    run_check_ints(&original.main, &[14]);
    assert_int(&results, 0, 14);
}

#[test]
fn test_trailing_bytes_only_rejected_in_exact_mode() {
    let mut bytes = Chunk::new(main_proto(
        vec![iabc(OpCode::Return0, 0, 0, 0)],
        Vec::new(),
    ))
    .dump();
    bytes.extend_from_slice(b"junk");

    assert!(lunette_vm::load(&bytes).is_ok());
    let err = LuaError::from(Chunk::undump_exact(&bytes).unwrap_err());
    assert!(err.is_format_fault());
    assert_eq!(err, LuaError::Undump(UndumpError::TrailingBytes { remaining: 4 }));
}

#[test]
fn test_truncated_chunk_is_format_fault() {
    let bytes = Chunk::new(main_proto(
        vec![iasbx(OpCode::LoadI, 0, 1), iabc(OpCode::Return1, 0, 0, 0)],
        Vec::new(),
    ))
    .dump();
    let err = lunette_vm::load(&bytes[..bytes.len() - 3]).unwrap_err();
    assert!(matches!(err, LuaError::Undump(UndumpError::Truncated { .. })));
}
