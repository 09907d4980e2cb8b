use super::helpers::*;

fn adder() -> Proto {
    let mut p = proto(vec![
        iabc(OpCode::Add, 2, 0, 1),
        iabc(OpCode::Return1, 2, 0, 0),
    ]);
    p.num_params = 2;
    p
}

fn env_with_natives<'p>() -> LuaValue<'p> {
    let mut env = Table::new();
    env.set(
        LuaValue::string("sum"),
        LuaValue::Native(NativeFunction::new("sum", |args| {
            let total = args.iter().filter_map(LuaValue::as_integer).sum::<i64>();
            Ok(vec![LuaValue::Integer(total)])
        })),
    )
    .unwrap();
    env.set(
        LuaValue::string("fail"),
        LuaValue::Native(NativeFunction::new("fail", |_| {
            Err(NativeError::new("boom"))
        })),
    )
    .unwrap();
    LuaValue::from(env)
}

// ---- Closures ----

#[test]
fn test_call_closure_with_arguments() {
    let mut p = proto(vec![
        iabx(OpCode::Closure, 0, 0),
        iasbx(OpCode::LoadI, 1, 4),
        iasbx(OpCode::LoadI, 2, 5),
        iabc(OpCode::Call, 0, 3, 1),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    p.protos = vec![adder()];
    run_check_ints(&p, &[9]);
}

#[test]
fn test_extra_arguments_are_ignored() {
    let mut p = proto(vec![
        iabx(OpCode::Closure, 0, 0),
        iasbx(OpCode::LoadI, 1, 1),
        iasbx(OpCode::LoadI, 2, 2),
        iasbx(OpCode::LoadI, 3, 100),
        iabc(OpCode::Call, 0, 4, 1),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    p.protos = vec![adder()];
    run_check_ints(&p, &[3]);
}

#[test]
fn test_missing_results_pad_with_tables() {
    let mut p = proto(vec![
        iabx(OpCode::Closure, 0, 0),
        iasbx(OpCode::LoadI, 1, 1),
        iasbx(OpCode::LoadI, 2, 2),
        iabc(OpCode::Call, 0, 3, 3),
        iabc(OpCode::Return, 0, 4, 0),
    ]);
    p.protos = vec![adder()];
    let results = run(&p);
    assert_int(&results, 0, 3);
    assert_table(&results, 1);
    assert_table(&results, 2);
}

// ---- Natives ----

#[test]
fn test_call_native_from_env() {
    let p = proto_with_constants(
        vec![
            iabc(OpCode::GetTabUp, 0, 0, 0),
            iasbx(OpCode::LoadI, 1, 2),
            iasbx(OpCode::LoadI, 2, 3),
            iasbx(OpCode::LoadI, 3, 4),
            iabc(OpCode::Call, 0, 4, 1),
            iabc(OpCode::Return1, 0, 0, 0),
        ],
        vec![Constant::String("sum".into())],
    );
    let results = run_with_env(&p, env_with_natives());
    assert_int(&results, 0, 9);
}

#[test]
fn test_native_error_propagates() {
    let p = proto_with_constants(
        vec![
            iabc(OpCode::GetTabUp, 0, 0, 0),
            iabc(OpCode::Call, 0, 1, 1),
            iabc(OpCode::Return1, 0, 0, 0),
        ],
        vec![Constant::String("fail".into())],
    );
    let err = run_with_env_err(&p, env_with_natives());
    assert_eq!(err, LuaError::Native(NativeError::new("boom")));
    assert_eq!(err.to_string(), "boom");
}

// ---- Non-callable fallback ----

#[test]
fn test_call_non_callable_fabricates_tables() {
    let p = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iasbx(OpCode::LoadI, 1, 2),
        iabc(OpCode::Call, 0, 2, 2),
        iabc(OpCode::Return, 0, 3, 0),
    ]);
    let results = run(&p);
    assert_eq!(results.len(), 2);
    assert_table(&results, 0);
    assert_table(&results, 1);
}

// ---- Tail calls ----

#[test]
fn test_tailcall_returns_callee_results() {
    let mut pair = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iasbx(OpCode::LoadI, 1, 2),
        iasbx(OpCode::LoadI, 2, 3),
        iabc(OpCode::Return, 0, 4, 0),
    ]);
    pair.num_params = 0;

    let mut p = proto(vec![
        iabx(OpCode::Closure, 0, 0),
        iabc(OpCode::TailCall, 0, 1, 1),
        iasbx(OpCode::LoadI, 0, 99),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    p.protos = vec![pair];
    // Not truncated to C
    run_check_ints(&p, &[1, 2, 3]);
}

#[test]
fn test_tailcall_non_callable() {
    let p = proto(vec![
        iabc(OpCode::LoadNil, 0, 0, 0),
        iabc(OpCode::TailCall, 0, 1, 3),
    ]);
    let results = run(&p);
    assert_eq!(results.len(), 3);
    for i in 0..3 {
        assert_table(&results, i);
    }
}

// ---- Returns ----

#[test]
fn test_return_to_top() {
    let mut p = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iasbx(OpCode::LoadI, 1, 2),
        iasbx(OpCode::LoadI, 2, 3),
        iabc(OpCode::Return, 1, 0, 0),
    ]);
    p.max_stack_size = 3;
    run_check_ints(&p, &[2, 3]);
}

#[test]
fn test_return_single_and_span() {
    let p = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iabc(OpCode::Return, 0, 1, 0),
    ]);
    run_check_ints(&p, &[1]);

    let p = proto(vec![
        iasbx(OpCode::LoadI, 3, 4),
        iasbx(OpCode::LoadI, 4, 5),
        iabc(OpCode::Return, 3, 3, 0),
    ]);
    run_check_ints(&p, &[4, 5]);
}

#[test]
fn test_return0_returns_nothing() {
    let p = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iabc(OpCode::Return0, 0, 0, 0),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    assert!(run(&p).is_empty());
}

#[test]
fn test_arguments_passed_from_host() {
    let p = adder();
    let mut vm = Vm::new();
    let results = vm
        .call_proto(&p, &[], &[LuaValue::Integer(20), LuaValue::Float(0.5)], 0)
        .unwrap();
    assert_float(&results, 0, 20.5);
}
