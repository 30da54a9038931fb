//! Property-based tests for the mode table and the genie's integer arithmetic.
use a68_lang::{Builtin, Genie, ModeTable, NodeId, TreeBuilder, Value};
use proptest::prelude::*;

/// `n` as a denotation, negated through the monadic operator when below zero.
fn integer(b: &mut TreeBuilder, n: i64) -> NodeId {
    let int = b.modes().standard().int;
    let magnitude = b.denotation(&n.unsigned_abs().to_string(), int);
    if n < 0 { b.monadic(Builtin::IntNeg, magnitude) } else { magnitude }
}

fn expected(op: Builtin, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        Builtin::IntAdd => lhs.checked_add(rhs),
        Builtin::IntSub => lhs.checked_sub(rhs),
        Builtin::IntMul => lhs.checked_mul(rhs),
        Builtin::IntOver => lhs.checked_div(rhs),
        Builtin::IntMod => lhs.checked_rem_euclid(rhs),
        _ => None,
    }
}

proptest! {
    #[test]
    fn test_interning_returns_the_same_mode(depth in 1usize..6, as_row in prop::collection::vec(any::<bool>(), 6)) {
        let mut modes = ModeTable::new();
        let build = |modes: &mut ModeTable| {
            let mut mode = modes.standard().real;
            for row in as_row.iter().take(depth) {
                mode = if *row { modes.row(mode) } else { modes.reference(mode) };
            }
            mode
        };

        let first = build(&mut modes);
        let len = modes.len();
        let second = build(&mut modes);
        prop_assert_eq!(first, second);
        prop_assert_eq!(modes.len(), len);
    }

    #[test]
    fn test_structures_intern_by_field_names(a in "[a-z]{1,4}", b in "[a-z]{1,4}") {
        let mut modes = ModeTable::new();
        let std = *modes.standard();
        let first = modes.structure(&[(a.as_str(), std.int), (b.as_str(), std.bool)]);
        let again = modes.structure(&[(a.as_str(), std.int), (b.as_str(), std.bool)]);
        let swapped = modes.structure(&[(a.as_str(), std.bool), (b.as_str(), std.int)]);
        prop_assert_eq!(first, again);
        prop_assert_ne!(first, swapped);
        prop_assert_eq!(modes.field(first, &a).map(|(index, _)| index), Some(0));
    }

    #[test]
    fn test_integer_arithmetic_is_checked(
        lhs in (i64::MIN + 1)..=i64::MAX,
        rhs in prop_oneof![Just(0i64), -1000i64..1000, (i64::MIN + 1)..=i64::MAX],
        op in prop::sample::select(vec![
            Builtin::IntAdd,
            Builtin::IntSub,
            Builtin::IntMul,
            Builtin::IntOver,
            Builtin::IntMod,
        ]),
    ) {
        let mut b = TreeBuilder::new();
        let l = integer(&mut b, lhs);
        let r = integer(&mut b, rhs);
        let root = b.formula(l, op, r);
        let tree = b.finish(root);

        let evaluated = Genie::new().evaluate(&tree, root).ok();
        prop_assert_eq!(evaluated, expected(op, lhs, rhs).map(Value::Int));
    }
}
