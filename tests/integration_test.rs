// Integration tests for compile + evaluate
//
// These tests drive complete expressions through the public API against
// serde_json documents.

use std::sync::Arc;
use std::thread;

use indexmap::IndexMap;
use jsonata_core::{compile, EvaluationConfig, Expression, JValue};
use serde_json::{json, Value};

/// Route evaluator logs to the test harness; run with `--nocapture` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn eval(expr: &str, data: Value) -> Value {
    compile(expr)
        .unwrap_or_else(|e| panic!("compile {:?}: {}", expr, e))
        .evaluate_json(&data)
        .unwrap_or_else(|e| panic!("evaluate {:?}: {}", expr, e))
}

fn eval_err(expr: &str, data: Value) -> jsonata_core::Error {
    match compile(expr) {
        Ok(compiled) => compiled
            .evaluate_json(&data)
            .expect_err("expected evaluation to fail"),
        Err(e) => e,
    }
}

fn orders() -> Value {
    json!({
        "tax": 2,
        "items": [
            {"type": "a", "price": 1},
            {"type": "b", "price": 2},
            {"type": "a", "price": 3}
        ]
    })
}

// ── Paths and sequences ──────────────────────────────────────────────────────

#[test]
fn test_simple_field_access() {
    let data = json!({"name": "Alice", "age": 30});
    assert_eq!(eval("name", data), json!("Alice"));
}

#[test]
fn test_nested_field_access() {
    let data = json!({"user": {"profile": {"name": "Bob"}}});
    assert_eq!(eval("user.profile.name", data.clone()), json!("Bob"));
    assert_eq!(eval("user.missing.name", data), Value::Null);
}

#[test]
fn test_path_maps_over_arrays() {
    assert_eq!(eval("items.price", orders()), json!([1, 2, 3]));
    assert_eq!(eval("items.type", orders()), json!(["a", "b", "a"]));
}

#[test]
fn test_singleton_sequences_unwrap() {
    let data = json!({"items": [{"price": 5}]});
    assert_eq!(eval("items.price", data.clone()), json!(5));
    assert_eq!(eval("items.price[]", data.clone()), json!([5]));
    assert_eq!(eval("items[].price", data), json!([5]));
}

#[test]
fn test_nested_arrays_flatten_one_level() {
    let data = json!({"a": [{"b": [1, 2]}, {"b": [3]}]});
    assert_eq!(eval("a.b", data.clone()), json!([1, 2, 3]));
    assert_eq!(eval("a.[b]", data), json!([[1, 2], [3]]));
}

#[test]
fn test_predicates() {
    assert_eq!(eval("items[price > 1].price", orders()), json!([2, 3]));
    assert_eq!(eval("items[0].price", orders()), json!(1));
    assert_eq!(eval("items[-1].price", orders()), json!(3));
    assert_eq!(eval("items[type = 'a'][1].price", orders()), json!(3));
    assert_eq!(eval("items[9].price", orders()), Value::Null);
}

#[test]
fn test_repeated_index_selects_repeatedly() {
    assert_eq!(eval("[1..3][[0, 0]]", json!({})), json!([1, 1]));
    assert_eq!(eval("[1..3][[2, 0]]", json!({})), json!([1, 3]));
}

#[test]
fn test_identity_returns_input_unchanged() {
    for data in [
        json!(null),
        json!(true),
        json!(1.5),
        json!("s"),
        json!([1, [2]]),
        json!({"a": null}),
    ] {
        assert_eq!(eval("$", data.clone()), data);
    }
}

#[test]
fn test_top_level_array_input() {
    let data = json!([{"x": 1}, {"x": 2}]);
    assert_eq!(eval("x", data.clone()), json!([1, 2]));
    assert_eq!(eval("$[1].x", data.clone()), json!(2));
    assert_eq!(eval("$", data.clone()), data);
}

#[test]
fn test_root_variable() {
    assert_eq!(eval("items.($$.tax * price)", orders()), json!([2, 4, 6]));
}

#[test]
fn test_wildcard_and_descendants() {
    let data = json!({"a": {"x": 1}, "b": {"x": 2, "c": {"x": 3}}});
    assert_eq!(eval("*.x", data.clone()), json!([1, 2]));
    assert_eq!(eval("**.x", data), json!([1, 2, 3]));
}

#[test]
fn test_output_is_plain_json() {
    let expr = compile("items.price").unwrap();
    let result = expr.evaluate(&JValue::from(orders())).unwrap();
    assert!(result.flags().is_empty());
    assert_eq!(expr.evaluate_str(&orders().to_string()).unwrap(), "[1,2,3]");
}

// ── Operators ────────────────────────────────────────────────────────────────

#[test]
fn test_arithmetic_expression() {
    let data = json!({"price": 100, "quantity": 5});
    assert_eq!(eval("price * quantity", data.clone()), json!(500));
    assert_eq!(eval("(price + 10) * quantity", data.clone()), json!(550));
    assert_eq!(eval("price / 8", data.clone()), json!(12.5));
    assert_eq!(eval("price % 7", data), json!(2));
}

#[test]
fn test_arithmetic_with_missing_operand() {
    assert_eq!(eval("missing + 1", json!({})), Value::Null);
}

#[test]
fn test_arithmetic_errors() {
    let err = eval_err("1 + 'a'", json!({}));
    assert_eq!(err.code(), "T2002");
    assert_eq!(err.details().token.as_deref(), Some("+"));
    assert_eq!(eval_err("'a' * 2", json!({})).code(), "T2001");
    assert_eq!(eval_err("1 / 0", json!({})).code(), "D1001");
    assert_eq!(eval_err("-'a'", json!({})).code(), "D1002");
}

#[test]
fn test_comparison_and_equality() {
    assert_eq!(eval("1 < 2", json!({})), json!(true));
    assert_eq!(eval("'b' >= 'a'", json!({})), json!(true));
    assert_eq!(eval("[1, {'a': 2}] = [1, {'a': 2}]", json!({})), json!(true));
    assert_eq!(eval("missing = missing", json!({})), json!(false));
    assert_eq!(eval("missing != 1", json!({})), json!(false));
    assert_eq!(eval_err("1 < 'a'", json!({})).code(), "T2009");
    assert_eq!(eval_err("true < 1", json!({})).code(), "T2010");
}

#[test]
fn test_boolean_operators() {
    assert_eq!(eval("true and 0", json!({})), json!(false));
    assert_eq!(eval("'' or [0, 1]", json!({})), json!(true));
    assert_eq!(eval("missing or false", json!({})), json!(false));
}

#[test]
fn test_string_concatenation() {
    assert_eq!(eval("'a' & 1 & missing & true", json!({})), json!("a1true"));
    assert_eq!(eval("'x' & {'k': [1]}", json!({})), json!("x{\"k\":[1]}"));
    assert_eq!(eval("'' & (0.1 + 0.2)", json!({})), json!("0.3"));
}

#[test]
fn test_range_and_membership() {
    assert_eq!(eval("[1..4]", json!({})), json!([1, 2, 3, 4]));
    assert_eq!(eval("[3..1]", json!({})), json!([]));
    assert_eq!(eval("2 in [1, 2]", json!({})), json!(true));
    assert_eq!(eval("'c' in items.type", orders()), json!(false));
    assert_eq!(eval_err("[0..1000001]", json!({})).code(), "D2014");
    assert_eq!(eval_err("[1.5..3]", json!({})).code(), "T2003");
}

#[test]
fn test_coalesce_and_default() {
    assert_eq!(eval("missing ?? 5", json!({})), json!(5));
    assert_eq!(eval("0 ?? 5", json!({})), json!(0));
    assert_eq!(eval("0 ?: 7", json!({})), json!(7));
    assert_eq!(eval("'x' ?: 7", json!({})), json!("x"));
}

#[test]
fn test_conditional_and_blocks() {
    assert_eq!(eval("tax > 1 ? 'high' : 'low'", orders()), json!("high"));
    assert_eq!(eval("tax > 5 ? 'high'", orders()), Value::Null);
    assert_eq!(eval("($a := 2; $b := $a * 3; $a + $b)", json!({})), json!(8));
}

// ── Object construction, grouping and sorting ────────────────────────────────

#[test]
fn test_object_constructor() {
    assert_eq!(
        eval("{'total': $sum(items.price), 'n': $count(items)}", orders()),
        json!({"total": 6, "n": 3})
    );
}

#[test]
fn test_group_by_merges_same_key() {
    assert_eq!(eval("items{type: price}", orders()), json!({"a": [1, 3], "b": 2}));
    assert_eq!(eval("items{type: $sum(price)}", orders()), json!({"a": 4, "b": 2}));
}

#[test]
fn test_group_by_preserves_key_order() {
    let result = eval("items{type: price}", orders());
    let keys: Vec<&String> = result.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[test]
fn test_duplicate_key_from_different_pairs() {
    assert_eq!(eval_err("{'a': 1, 'a': 2}", json!({})).code(), "D1009");
    assert_eq!(eval_err("{1: 2}", json!({})).code(), "T1003");
}

#[test]
fn test_order_by() {
    assert_eq!(eval("items^(>price).price", orders()), json!([3, 2, 1]));
    assert_eq!(eval("items^(type, >price).price", orders()), json!([3, 1, 2]));
    assert_eq!(eval_err("items^(price = 1).price", orders()).code(), "T2008");
}

#[test]
fn test_order_by_absent_keys_last() {
    let data = json!({"xs": [{"a": 1, "id": "p"}, {"id": "q"}, {"a": 2, "id": "r"}]});
    assert_eq!(eval("xs^(>a).id", data.clone()), json!(["r", "p", "q"]));
    assert_eq!(eval("xs^(a).id", data), json!(["p", "r", "q"]));
}

#[test]
fn test_order_by_skips_type_check_against_absent() {
    let data = json!({"xs": [{"id": "q"}, {"a": true, "id": "p"}]});
    assert_eq!(eval("xs^(a).id", data), json!(["p", "q"]));
}

#[test]
fn test_order_by_is_stable() {
    let data = json!({"xs": [{"k": 1, "id": "p"}, {"k": 0, "id": "q"}, {"k": 1, "id": "r"}]});
    assert_eq!(eval("xs^(k).id", data), json!(["q", "p", "r"]));
}

// ── Tuple streams: focus, index and parent ───────────────────────────────────

#[test]
fn test_index_binding() {
    assert_eq!(eval("items#$pos[$pos < 2].price", orders()), json!([1, 2]));
}

#[test]
fn test_focus_binding() {
    assert_eq!(
        eval("items@$i.{'p': $i.price}", orders()),
        json!([{"p": 1}, {"p": 2}, {"p": 3}])
    );
}

#[test]
fn test_parent_operator() {
    let data = json!({
        "orders": [
            {"id": 1, "items": [{"n": "x"}, {"n": "y"}]},
            {"id": 2, "items": [{"n": "z"}]}
        ]
    });
    assert_eq!(
        eval("orders.items.{'n': n, 'order': %.id}", data),
        json!([
            {"n": "x", "order": 1},
            {"n": "y", "order": 1},
            {"n": "z", "order": 2}
        ])
    );
}

#[test]
fn test_parent_outside_path_is_rejected() {
    assert_eq!(compile("%").err().map(|e| e.code()), Some("S0217"));
}

// ── Functions ────────────────────────────────────────────────────────────────

#[test]
fn test_lambda_and_closure() {
    assert_eq!(
        eval("($add := function($x){ function($y){ $x + $y } }; $add(2)(3))", json!({})),
        json!(5)
    );
    assert_eq!(eval("(function($a, $b){ $b })(1)", json!({})), Value::Null);
}

#[test]
fn test_lambda_signature_is_checked() {
    let err = eval_err("(function($n)<n:n>{ $n })('x')", json!({}));
    assert_eq!(err.code(), "T0410");
}

#[test]
fn test_builtin_signature_errors() {
    let err = eval_err("$uppercase(1)", json!({}));
    assert_eq!(err.code(), "T0410");
    assert_eq!(err.details().token.as_deref(), Some("uppercase"));
    assert_eq!(eval_err("$sum([1, 'x'])", json!({})).code(), "T0412");
    assert_eq!(eval("s.$uppercase()", json!({"s": "abc"})), json!("ABC"));
}

#[test]
fn test_invoking_non_functions() {
    let err = eval_err("sum([1])", json!({}));
    assert_eq!(err.code(), "T1005");
    assert_eq!(err.details().token.as_deref(), Some("sum"));
    assert_eq!(eval_err("$nothing()", json!({})).code(), "T1006");
    assert_eq!(eval_err("sum(?)", json!({})).code(), "T1007");
    assert_eq!(eval_err("$nothing(?)", json!({})).code(), "T1008");
}

#[test]
fn test_partial_application() {
    assert_eq!(
        eval("($first := $substring(?, 0, 2); $first('hello'))", json!({})),
        json!("he")
    );
}

#[test]
fn test_function_application_operator() {
    assert_eq!(eval("'hello' ~> $uppercase()", json!({})), json!("HELLO"));
    assert_eq!(eval("items.price ~> $sum()", orders()), json!(6));
    assert_eq!(
        eval("($f := $uppercase ~> $substring(?, 0, 2); $f('hello'))", json!({})),
        json!("HE")
    );
    assert_eq!(eval_err("1 ~> 2", json!({})).code(), "T2006");
}

#[test]
fn test_higher_order_builtins() {
    assert_eq!(eval("$map([1, 2, 3], function($v){ $v * 2 })", json!({})), json!([2, 4, 6]));
    assert_eq!(
        eval("$filter([1, 2, 3, 4], function($v, $i){ $i > 1 })", json!({})),
        json!([3, 4])
    );
    assert_eq!(eval("$reduce([1, 2, 3], function($a, $b){ $a + $b })", json!({})), json!(6));
    assert_eq!(
        eval("$reduce([1, 2, 3], function($a, $b){ $a + $b }, 10)", json!({})),
        json!(16)
    );
    assert_eq!(eval_err("$reduce([1], function($a){ $a })", json!({})).code(), "D3050");
}

#[test]
fn test_string_builtins() {
    assert_eq!(eval("$join(items.type, '-')", orders()), json!("a-b-a"));
    assert_eq!(eval("$contains('hello', /l+/)", json!({})), json!(true));
    assert_eq!(eval("$string([1, 2])", json!({})), json!("[1,2]"));
    assert_eq!(eval("$number('12.5')", json!({})), json!(12.5));
    assert_eq!(eval_err("$number('twelve')", json!({})).code(), "D3030");
}

#[test]
fn test_object_builtins() {
    assert_eq!(eval("$keys(items[0])", orders()), json!(["type", "price"]));
    assert_eq!(eval("$lookup(items[1], 'price')", orders()), json!(2));
    assert_eq!(eval("$exists(items[5])", orders()), json!(false));
}

#[test]
fn test_now_is_stable_within_evaluation() {
    assert_eq!(eval("$now() = $now()", json!({})), json!(true));
    assert_eq!(eval("$millis() > 0", json!({})), json!(true));
}

#[test]
fn test_registered_function_and_bindings() {
    let mut expr = compile("$greet(name) & $suffix").unwrap();
    expr.register_function("greet", Some("<s:s>"), |args, _| {
        Ok(JValue::from(format!("Hello, {}", args[0].as_str().unwrap_or_default())))
    })
    .unwrap();
    let mut bindings = IndexMap::new();
    bindings.insert("suffix".to_string(), JValue::from("!"));
    let result = expr
        .evaluate_with_bindings(&JValue::from(json!({"name": "Ada"})), &bindings)
        .unwrap();
    assert_eq!(result, JValue::from("Hello, Ada!"));
}

// ── Transform ────────────────────────────────────────────────────────────────

#[test]
fn test_transform_updates_copy() {
    let data = json!({"items": [{"a": 1}, {"a": 2}]});
    assert_eq!(
        eval("$ ~> |items|{'seen': true}|", data.clone()),
        json!({"items": [{"a": 1, "seen": true}, {"a": 2, "seen": true}]})
    );
    assert_eq!(
        eval("($t := $ ~> |items|{'a': 0}|; [$t.items.a, items.a])", data),
        json!([0, 0, 1, 2])
    );
}

#[test]
fn test_transform_delete() {
    let data = json!({"items": [{"a": 1, "b": 2}]});
    assert_eq!(eval("$ ~> |items|{}, 'a'|", data.clone()), json!({"items": [{"b": 2}]}));
    assert_eq!(eval_err("$ ~> |items|5|", data.clone()).code(), "T2011");
    assert_eq!(eval_err("$ ~> |items|{}, 5|", data).code(), "T2012");
}

// ── Recursion and limits ─────────────────────────────────────────────────────

const TAIL_SUM: &str = "($total := function($n, $acc) { $n = 0 ? $acc : $total($n - 1, $acc + $n) }; $total(50000, 0))";

#[test]
fn test_tail_recursion_runs_in_bounded_depth() {
    init_tracing();
    assert_eq!(eval(TAIL_SUM, json!({})), json!(1250025000));
}

#[test]
fn test_small_depth_limit_stops_tail_recursion() {
    init_tracing();
    let expr = compile(TAIL_SUM).unwrap().with_config(EvaluationConfig {
        timeout_ms: 0,
        max_depth: 3,
    });
    let err = expr.evaluate(&JValue::Null).unwrap_err();
    assert_eq!(err.code(), "U1001");
    assert!(err.is_guard());
}

#[test]
fn test_deep_non_tail_recursion_hits_depth_limit() {
    let err = eval_err(
        "($f := function($n) { $n = 0 ? 0 : 1 + $f($n - 1) }; $f(1000))",
        json!({}),
    );
    assert_eq!(err.code(), "U1001");
}

#[test]
fn test_timeout() {
    init_tracing();
    let expr = compile("$reduce([1..1000000], function($a, $b){ $a + $b })")
        .unwrap()
        .with_config(EvaluationConfig {
            timeout_ms: 1,
            max_depth: 0,
        });
    assert_eq!(expr.evaluate(&JValue::Null).unwrap_err().code(), "U1002");
}

// ── Compilation ──────────────────────────────────────────────────────────────

#[test]
fn test_syntax_errors() {
    assert_eq!(compile("").err().map(|e| e.code()), Some("S0207"));
    assert_eq!(compile("a.'b").err().map(|e| e.code()), Some("S0101"));
    assert_eq!(compile("1 +").err().map(|e| e.code()), Some("S0207"));
    assert_eq!(compile("($x := 1").err().map(|e| e.code()), Some("S0203"));
}

#[test]
fn test_recovery_mode_collects_errors() {
    let expr = Expression::compile_with_recovery("(a; b");
    assert!(!expr.errors().is_empty());
    assert!(expr.errors().iter().all(|e| e.is_syntax()));
    assert_eq!(expr.evaluate(&JValue::Null).unwrap_err().code(), "S0500");
}

#[test]
fn test_shared_across_threads() {
    let expr = Arc::new(compile("$sum(values) * factor").unwrap());
    let handles: Vec<_> = (1..=4)
        .map(|factor| {
            let expr = Arc::clone(&expr);
            thread::spawn(move || {
                let data = json!({"values": [1, 2, 3], "factor": factor});
                expr.evaluate_json(&data).unwrap()
            })
        })
        .collect();
    let results: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![json!(6), json!(12), json!(18), json!(24)]);
}
