use super::helpers::*;

fn binop(op: OpCode, lhs: Constant, rhs: Constant) -> Proto {
    proto_with_constants(
        vec![
            iabx(OpCode::LoadK, 0, 0),
            iabx(OpCode::LoadK, 1, 1),
            iabc(op, 2, 0, 1),
            iabc(OpCode::Return1, 2, 0, 0),
        ],
        vec![lhs, rhs],
    )
}

// ---- Register forms ----

#[test]
fn test_integer_ops() {
    let cases = [
        (OpCode::Sub, 3),
        (OpCode::Mul, 70),
        (OpCode::Div, 1),
        (OpCode::IDiv, 1),
        (OpCode::Mod, 3),
        (OpCode::BAnd, 2),
        (OpCode::BOr, 15),
        (OpCode::BXor, 13),
        (OpCode::Shl, 1280),
        (OpCode::Shr, 0),
    ];
    for (op, expected) in cases {
        let p = binop(op, Constant::Integer(10), Constant::Integer(7));
        let results = run(&p);
        assert_int(&results, 0, expected);
    }
}

#[test]
fn test_pow_is_float() {
    let p = binop(OpCode::Pow, Constant::Integer(2), Constant::Integer(8));
    assert_float(&run(&p), 0, 256.0);
}

#[test]
fn test_float_division() {
    let p = binop(OpCode::Div, Constant::Float(7.0), Constant::Integer(2));
    assert_float(&run(&p), 0, 3.5);
    let p = binop(OpCode::IDiv, Constant::Float(-7.0), Constant::Integer(2));
    assert_float(&run(&p), 0, -3.0);
}

#[test]
fn test_integer_division_by_zero_faults() {
    let p = binop(OpCode::IDiv, Constant::Integer(1), Constant::Integer(0));
    assert_eq!(run_err(&p), LuaError::DivideByZero);
}

#[test]
fn test_string_operand_counts_as_zero() {
    let p = binop(OpCode::Add, Constant::String("12".into()), Constant::Integer(3));
    assert_float(&run(&p), 0, 3.0);
}

// ---- Constant and immediate forms ----

#[test]
fn test_constant_forms() {
    let p = proto_with_constants(
        vec![
            iasbx(OpCode::LoadI, 0, 20),
            iabc(OpCode::AddK, 1, 0, 0),
            iabc(OpCode::SubK, 2, 0, 0),
            iabc(OpCode::MulK, 3, 0, 0),
            iabc(OpCode::ModK, 4, 0, 0),
            iabc(OpCode::DivK, 5, 0, 1),
            iabc(OpCode::Return, 1, 6, 0),
        ],
        vec![Constant::Integer(6), Constant::Float(0.5)],
    );
    let results = run(&p);
    assert_int(&results, 0, 26);
    assert_int(&results, 1, 14);
    assert_int(&results, 2, 120);
    assert_int(&results, 3, 2);
    assert_float(&results, 4, 40.0);
}

#[test]
fn test_immediate_forms() {
    let p = proto(vec![
        iasbx(OpCode::LoadI, 0, 3),
        iabc(OpCode::AddI, 1, 0, (-5i8) as u8),
        iabc(OpCode::ShlI, 2, 0, 1),
        iasbx(OpCode::LoadI, 3, -16),
        iabc(OpCode::ShrI, 4, 3, 2),
        iabc(OpCode::Return, 1, 5, 0),
    ]);
    let results = run(&p);
    assert_int(&results, 0, -2);
    // ShlI shifts the immediate by the register
    assert_int(&results, 1, 8);
    assert_int(&results, 2, -16);
    assert_int(&results, 3, -4);
}

#[test]
fn test_metamethod_opcodes_are_skipped_over() {
    let p = proto(vec![
        iasbx(OpCode::LoadI, 0, 2),
        iasbx(OpCode::LoadI, 1, 3),
        iabc(OpCode::Mul, 2, 0, 1),
        iabc(OpCode::MmBin, 0, 1, 8),
        iabc(OpCode::MmBinI, 0, 1, 8),
        iabc(OpCode::MmBinK, 0, 1, 8),
        iabc(OpCode::Return1, 2, 0, 0),
    ]);
    run_check_ints(&p, &[6]);
}

// ---- Unary ----

#[test]
fn test_unary_ops() {
    let p = proto_with_constants(
        vec![
            iasbx(OpCode::LoadI, 0, 5),
            iabc(OpCode::Unm, 1, 0, 0),
            iabc(OpCode::BNot, 2, 0, 0),
            iabc(OpCode::Not, 3, 0, 0),
            iabx(OpCode::LoadK, 4, 0),
            iabc(OpCode::Len, 5, 4, 0),
            iabc(OpCode::Len, 6, 0, 0),
            iabc(OpCode::Return, 1, 7, 0),
        ],
        vec![Constant::String("hello".into())],
    );
    let results = run(&p);
    assert_int(&results, 0, -5);
    assert_int(&results, 1, !5);
    assert_bool(&results, 2, false);
    assert_str(&results, 3, "hello");
    // Only tables have a length; strings count as 0.
    assert_int(&results, 4, 0);
    assert_int(&results, 5, 0);
}

#[test]
fn test_not_nil_is_true() {
    let p = proto(vec![
        iabc(OpCode::LoadNil, 0, 0, 0),
        iabc(OpCode::Not, 1, 0, 0),
        iabc(OpCode::Return1, 1, 0, 0),
    ]);
    assert_bool(&run(&p), 0, true);
}

#[test]
fn test_concat_collects_into_table() {
    let p = proto(vec![
        iasbx(OpCode::LoadI, 0, 1),
        iasbx(OpCode::LoadI, 1, 2),
        iasbx(OpCode::LoadI, 2, 3),
        iabc(OpCode::Concat, 0, 3, 0),
        iabc(OpCode::Len, 3, 0, 0),
        iabc(OpCode::GetI, 4, 0, 3),
        iabc(OpCode::Return, 3, 3, 0),
    ]);
    run_check_ints(&p, &[3, 3]);
}
