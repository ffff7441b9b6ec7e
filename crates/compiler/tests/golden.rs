//! End-to-end scenarios and testable-property checks: compile a literal
//! source string, run it against an in-memory host, and assert on the
//! captured `trace` output lines.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use oyc_compiler::CompilerConfig;
use oyc_runtime::{Host, Value, Vm};
use pretty_assertions::assert_eq;

struct RecordingHost {
    lines: Rc<RefCell<Vec<String>>>,
}

impl Host for RecordingHost {
    fn load(&self, path: &str, relative_to: &Path) -> Result<(PathBuf, String), String> {
        let resolved = oyc_runtime::require::resolve_require_path(path, relative_to);
        let text = std::fs::read_to_string(&resolved).map_err(|e| format!("{}: {e}", resolved.display()))?;
        Ok((resolved, text))
    }

    fn write_line(&self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }

    fn stderr_line(&self, line: &str) {
        self.lines.borrow_mut().push(format!("stderr: {line}"));
    }
}

fn compile_fn(config: CompilerConfig) -> oyc_runtime::CompileFn {
    Rc::new(move |src: &str, path: &Path| oyc_compiler::compile(src, path, &config).map_err(|e| e.to_string()))
}

/// Compiles and runs `source` as the top-level script at `file`, returning
/// every line written via `trace`/an uncaught error's `stderr_line`.
fn run(source: &str, file: &Path, args: Vec<Value>) -> Vec<String> {
    let config = CompilerConfig::default();
    let proto = oyc_compiler::compile(source, file, &config).expect("source should compile");
    let lines = Rc::new(RefCell::new(Vec::new()));
    let host = RecordingHost { lines: lines.clone() };
    let mut vm = Vm::new(host, compile_fn(config));
    vm.run(proto, file.to_path_buf(), args).expect("script should run without error");
    Rc::try_unwrap(lines).unwrap().into_inner()
}

fn run_default(source: &str) -> Vec<String> {
    run(source, &PathBuf::from("<golden>.oyc"), Vec::new())
}

// --- spec.md §8, "End-to-end scenarios" ---

#[test]
fn casts_produce_the_documented_conversions() {
    let out = run_default(
        r#"trace(1.1, int(1.1), 0.5, str(100), int("100"), float("100.1"), bool(1));"#,
    );
    assert_eq!(out, vec![r#"1.1 1 0.5 "100" 100 100.1 true"#]);
}

#[test]
fn array_mutation_then_delete_truncates_the_tail() {
    let out = run_default(
        r#"
        auto arr = [] {0, 1, 2, 3, 4, 5};
        trace("output1:", arr);
        delete arr[3];
        trace("output2:", arr);
        "#,
    );
    assert_eq!(
        out,
        vec![
            r#""output1:" [] {0, 1, 2, 3, 4, 5}"#,
            r#""output2:" [] {0, 1, 2}"#,
        ]
    );
}

#[test]
fn struct_mutation_then_delete_preserves_remaining_order() {
    let out = run_default(
        r#"
        auto s = struct { .foo = 1, .bar = 2, .haha = "^_^" };
        trace(s.foo == 1);
        trace(s);
        delete s.foo;
        trace(s);
        "#,
    );
    assert_eq!(
        out,
        vec![
            "true",
            r#"struct {["foo"] = 1, ["bar"] = 2, ["haha"] = "^_^"}"#,
            r#"struct {["bar"] = 2, ["haha"] = "^_^"}"#,
        ]
    );
}

#[test]
fn switch_without_break_falls_through_to_the_next_case() {
    let out = run_default(
        r#"
        auto n = 9;
        switch (n) {
            case 9:
                trace("9a");
            case 10:
                trace("9b");
            case 11:
                trace("9c");
                break;
            default:
                trace("unreached");
        }
        "#,
    );
    assert_eq!(out, vec!["\"9a\"", "\"9b\"", "\"9c\""]);
}

#[test]
fn requiring_a_script_forwards_argv_as_one_array() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("test1.oyc"),
        r#"trace("test1's argv:", argv);"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("test2.oyc"),
        r#"
        trace("test2's argv:", argv);
        auto x = argv[0] + argv[1];
        trace("x=", x);
        "#,
    )
    .unwrap();
    let main_src = r#"
        require("test1.oyc", "x", "y", "z");
        require("test2.oyc", "hi", "hello");
        "#;
    let out = run(main_src, &dir.path().join("main.oyc"), Vec::new());
    assert_eq!(
        out,
        vec![
            r#""test1's argv:" [] {"x", "y", "z"}"#,
            r#""test2's argv:" [] {"hi", "hello"}"#,
            r#""x=" "hihello""#,
        ]
    );
}

// --- spec.md §8, "Invariants / laws" ---

#[test]
fn typeof_is_one_of_the_nine_documented_strings() {
    let out = run_default(
        r#"
        auto s = struct {};
        trace(typeof(null), typeof(true), typeof(1), typeof(1.0), typeof("s"));
        trace(typeof([] {}), typeof(struct {}), typeof(() {}), typeof(s.missing));
        "#,
    );
    assert_eq!(
        out,
        vec![
            r#""null" "bool" "int" "float" "str""#,
            r#""array" "struct" "closure" "void""#,
        ]
    );
}

#[test]
fn array_append_via_sizeof_index_grows_by_one() {
    let out = run_default(
        r#"
        auto a = [] {10, 20};
        auto old_len = sizeof(a);
        a[sizeof(a)] = 30;
        trace(sizeof(a) == old_len + 1, a[old_len] == 30);
        "#,
    );
    assert_eq!(out, vec!["true true"]);
}

#[test]
fn delete_on_array_truncates_exactly_to_the_index() {
    let out = run_default(
        r#"
        auto a = [] {1, 2, 3, 4, 5};
        delete a[2];
        trace(sizeof(a), a[0], a[1]);
        "#,
    );
    assert_eq!(out, vec!["2 1 2"]);
}

#[test]
fn writing_a_void_struct_key_appends_and_preserves_position_on_overwrite() {
    let out = run_default(
        r#"
        auto s = struct {};
        trace(typeof(s.k) == "void");
        s.k = 1;
        s.other = 2;
        s.k = 3;
        trace(s);
        "#,
    );
    assert_eq!(out, vec!["true", r#"struct {["k"] = 3, ["other"] = 2}"#]);
}

#[test]
fn casts_round_trip_through_int_float_str() {
    let out = run_default(
        r#"
        trace(int(float(42)) == 42);
        trace(float(str(2.5)) == 2.5);
        trace(str(int(7)) == "7");
        "#,
    );
    assert_eq!(out, vec!["true", "true", "true"]);
}

#[test]
fn and_short_circuits_without_evaluating_the_right_operand() {
    let out = run_default(
        r#"
        auto calls = [] {0};
        auto bump = () { calls[0] = calls[0] + 1; return true; };
        auto ignored = false && bump();
        trace(calls[0]);
        trace(typeof(ignored));
        trace(ignored);
        "#,
    );
    assert_eq!(out, vec!["0", "\"bool\"", "false"]);
}

#[test]
fn or_short_circuits_without_evaluating_the_right_operand() {
    let out = run_default(
        r#"
        auto calls = [] {0};
        auto bump = () { calls[0] = calls[0] + 1; return true; };
        auto ignored = true || bump();
        trace(calls[0]);
        trace(typeof(ignored));
        trace(ignored);
        "#,
    );
    assert_eq!(out, vec!["0", "\"bool\"", "true"]);
}

#[test]
fn and_coerces_a_truthy_non_bool_winning_operand_to_bool() {
    // `1 && 2` picks the right operand (2, truthy) but spec §4.3 requires the
    // result itself to be a bool, not the int 2.
    let out = run_default(r#"trace(typeof(1 && 2)); trace(1 && 2);"#);
    assert_eq!(out, vec!["\"bool\"", "true"]);
}

#[test]
fn closures_from_the_same_loop_capture_independent_upvalue_cells() {
    let out = run_default(
        r#"
        auto fns = [] {};
        auto i = 0;
        while (i < 3) {
            auto n = i;
            fns[i] = () { return n; };
            i = i + 1;
        }
        trace(fns[0](), fns[1](), fns[2]());
        "#,
    );
    assert_eq!(out, vec!["0 1 2"]);
}

#[test]
fn control_flow_covers_for_foreach_ternary_and_compound_assignment() {
    let out = run_default(
        r#"
        auto total = 0;
        for (auto i = 0; i < 5; i += 1) {
            total += i;
        }
        trace(total);

        auto parity = [] {};
        foreach (auto k, v : [] {10, 11, 12}) {
            parity[k] = v % 2 == 0 ? "even" : "odd";
        }
        trace(parity);

        auto n = 0;
        do {
            n++;
        } while (n < 3);
        trace(n);
        "#,
    );
    assert_eq!(
        out,
        vec![
            "10",
            r#"[] {"even", "odd", "even"}"#,
            "3",
        ]
    );
}

#[test]
fn non_integer_array_index_is_a_value_error_not_a_type_error() {
    use oyc_runtime::RuntimeError;

    let source = r#"auto a = [] {1, 2, 3}; trace(a["nope"]);"#;
    let file = PathBuf::from("<golden>.oyc");
    let config = CompilerConfig::default();
    let proto = oyc_compiler::compile(source, &file, &config).expect("source should compile");
    let lines = Rc::new(RefCell::new(Vec::new()));
    let host = RecordingHost { lines: lines.clone() };
    let mut vm = Vm::new(host, compile_fn(config));
    let err = vm
        .run(proto, file, Vec::new())
        .expect_err("indexing an array with a str key should fail");
    assert!(matches!(err, RuntimeError::Value { .. }), "expected a Value error, got {err:?}");
}
