use super::helpers::*;

// ---- Loads ----

#[test]
fn test_load_variants() {
    let p = proto_with_constants(
        vec![
            iasbx(OpCode::LoadF, 0, -3),
            iabx(OpCode::LoadK, 1, 0),
            iabc(OpCode::LoadTrue, 2, 0, 0),
            iabc(OpCode::LoadFalse, 3, 0, 0),
            iabc(OpCode::Move, 4, 1, 0),
            iabc(OpCode::Return, 0, 6, 0),
        ],
        vec![Constant::String("k".into())],
    );
    let results = run(&p);
    assert_float(&results, 0, -3.0);
    assert_str(&results, 1, "k");
    assert_bool(&results, 2, true);
    assert_bool(&results, 3, false);
    assert_str(&results, 4, "k");
}

#[test]
fn test_loadkx_reads_extra_word() {
    let p = proto_with_constants(
        vec![
            iabx(OpCode::LoadKx, 0, 0),
            iax(OpCode::ExtraArg, 1),
            iabc(OpCode::Return1, 0, 0, 0),
        ],
        vec![Constant::Integer(10), Constant::Integer(20)],
    );
    run_check_ints(&p, &[20]);
}

#[test]
fn test_loadkx_without_extra_word() {
    let p = proto_with_constants(
        vec![iabx(OpCode::LoadKx, 0, 0)],
        vec![Constant::Integer(10)],
    );
    assert!(matches!(
        run_err(&p),
        LuaError::IndexOutOfRange {
            what: "extra argument",
            ..
        }
    ));
}

#[test]
fn test_lfalseskip_skips_next() {
    let p = proto(vec![
        iabc(OpCode::LFalseSkip, 0, 0, 0),
        iabc(OpCode::LoadTrue, 0, 0, 0),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    assert_bool(&run(&p), 0, false);
}

#[test]
fn test_loadnil_clears_range() {
    let p = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iasbx(OpCode::LoadI, 1, 2),
        iasbx(OpCode::LoadI, 2, 3),
        iabc(OpCode::LoadNil, 0, 1, 0),
        iabc(OpCode::Return, 0, 4, 0),
    ]);
    let results = run(&p);
    assert_nil(&results, 0);
    assert_nil(&results, 1);
    assert_int(&results, 2, 3);
}

// ---- Jumps ----

#[test]
fn test_jmp_forward() {
    let p = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        isj(1),
        iasbx(OpCode::LoadI, 0, 2),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    run_check_ints(&p, &[1]);
}

#[test]
fn test_jmp_before_start_faults() {
    let p = proto(vec![isj(-5)]);
    assert!(matches!(
        run_err(&p),
        LuaError::IndexOutOfRange {
            what: "jump target",
            index: -4,
            ..
        }
    ));
}

#[test]
fn test_running_off_the_end_returns_nothing() {
    let p = proto(vec![iasbx(OpCode::LoadI, 0, 1)]);
    assert!(run(&p).is_empty());
}

// ---- Comparisons ----

fn compare_then_pick(cmp: Instruction) -> Proto {
    // R0 = 1, R1 = 2; the compare either runs or skips `return R0`.
    proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iasbx(OpCode::LoadI, 1, 2),
        cmp,
        iabc(OpCode::Return1, 0, 0, 0),
        iabc(OpCode::Return1, 1, 0, 0),
    ])
}

#[test]
fn test_compare_skip_follows_k() {
    // 1 < 2 is true: k=0 mismatches and skips, k=1 falls through
    run_check_ints(&compare_then_pick(iabc(OpCode::Lt, 0, 1, 0)), &[2]);
    run_check_ints(&compare_then_pick(iabck(OpCode::Lt, 0, 1, 0)), &[1]);
    run_check_ints(&compare_then_pick(iabck(OpCode::Le, 0, 1, 0)), &[1]);
    run_check_ints(&compare_then_pick(iabck(OpCode::Eq, 0, 1, 0)), &[2]);
    run_check_ints(&compare_then_pick(iabc(OpCode::Eq, 0, 1, 0)), &[1]);
}

#[test]
fn test_compare_immediate() {
    run_check_ints(&compare_then_pick(iabck(OpCode::EqI, 0, 1, 0)), &[1]);
    run_check_ints(&compare_then_pick(iabck(OpCode::LtI, 0, 2, 0)), &[1]);
    run_check_ints(&compare_then_pick(iabck(OpCode::LeI, 0, 1, 0)), &[1]);
    run_check_ints(&compare_then_pick(iabck(OpCode::GtI, 0, (-1i8) as u8, 0)), &[1]);
    run_check_ints(&compare_then_pick(iabck(OpCode::GeI, 0, 2, 0)), &[2]);
}

#[test]
fn test_eqk_mixed_number_kinds() {
    let mut p = compare_then_pick(iabck(OpCode::EqK, 0, 0, 0));
    p.constants = vec![Constant::Float(1.0)];
    run_check_ints(&p, &[1]);
}

#[test]
fn test_test_and_testset() {
    // Test: false is not truthy, so k=1 skips the overwrite
    let p = proto(vec![
        iabc(OpCode::LoadFalse, 0, 0, 0),
        iasbx(OpCode::LoadI, 1, 10),
        iabck(OpCode::Test, 0, 0, 0),
        iasbx(OpCode::LoadI, 1, 20),
        iabc(OpCode::Return1, 1, 0, 0),
    ]);
    run_check_ints(&p, &[10]);

    // TestSet copies only when it does not skip
    let p = proto(vec![
        iasbx(OpCode::LoadI, 1, 7),
        iabck(OpCode::TestSet, 0, 1, 0),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    run_check_ints(&p, &[7]);

    let p = proto(vec![
        iasbx(OpCode::LoadI, 1, 7),
        iabc(OpCode::TestSet, 0, 1, 0),
        iabc(OpCode::Return1, 1, 0, 0),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    let results = run(&p);
    assert_nil(&results, 0);
}

// ---- Numeric for ----

fn countdown(start: Constant) -> Proto {
    proto_with_constants(
        vec![
            iabx(OpCode::LoadK, 0, 0),
            iasbx(OpCode::LoadI, 1, 0),
            iabx(OpCode::ForPrep, 0, 1),
            iabc(OpCode::AddI, 1, 1, 1),
            iabx(OpCode::ForLoop, 0, 2),
            iabc(OpCode::Return, 0, 3, 0),
        ],
        vec![start],
    )
}

#[test]
fn test_for_loop_integer_counter() {
    run_check_ints(&countdown(Constant::Integer(5)), &[0, 5]);
}

#[test]
fn test_for_loop_float_counter_keeps_kind() {
    let p = countdown(Constant::Float(2.5));
    let results = run(&p);
    assert_float(&results, 0, -0.5);
    assert_int(&results, 1, 3);
}

#[test]
fn test_for_prep_skips_non_positive() {
    run_check_ints(&countdown(Constant::Integer(0)), &[0, 0]);
    run_check_ints(&countdown(Constant::Integer(-3)), &[-3, 0]);

    let p = countdown(Constant::String("3".into()));
    let results = run(&p);
    assert_str(&results, 0, "3");
    assert_int(&results, 1, 0);
}

#[test]
fn test_generic_for_is_unimplemented() {
    for op in [OpCode::TForPrep, OpCode::TForCall, OpCode::TForLoop] {
        let err = run_err(&proto(vec![iabc(op, 0, 0, 0)]));
        assert!(err.is_unimplemented(), "{op}: {err}");
        assert!(!err.is_format_fault());
    }
}

#[test]
fn test_close_detaches_captured_registers() {
    let mut child = proto(vec![
        iabc(OpCode::GetUpval, 0, 0, 0),
        iabc(OpCode::Return1, 0, 0, 0),
    ]);
    child.upvalues = vec![upval(true, 0)];

    let mut p = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iabx(OpCode::Closure, 1, 0),
        iabc(OpCode::Close, 0, 0, 0),
        iasbx(OpCode::LoadI, 0, 2),
        iabc(OpCode::Call, 1, 1, 1),
        iabc(OpCode::Return, 0, 3, 0),
    ]);
    p.protos = vec![child];
    run_check_ints(&p, &[2, 1]);
}
