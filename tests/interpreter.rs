//! End-to-end evaluation tests: each program runs through the full
//! scanner → parser → resolver → interpreter pipeline, then assertions
//! inspect global bindings or the reported runtime error.

#[cfg(test)]
mod interpreter_tests {
    use ember_lang as ember;

    use ember::error::{EmberError, RuntimeErrorKind};
    use ember::interpreter::Interpreter;
    use ember::parser::Parser;
    use ember::resolver::Resolver;
    use ember::scanner::Scanner;
    use ember::token::Token;
    use ember::value::Value;

    /// Runs `source` to completion and hands back the interpreter so tests
    /// can inspect global bindings.
    fn run(source: &str) -> Result<Interpreter, EmberError> {
        let tokens: Vec<Token> = Scanner::new(source.as_bytes())
            .collect::<Result<_, _>>()
            .expect("scan failed");

        let mut parser = Parser::new(&tokens);
        let statements = parser.parse().expect("parse failed");

        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter)
            .resolve(&statements)
            .expect("resolve failed");

        interpreter.interpret(&statements)?;
        Ok(interpreter)
    }

    fn global(interpreter: &Interpreter, name: &str) -> Value {
        interpreter
            .globals
            .borrow()
            .get(name, 0)
            .unwrap_or_else(|_| panic!("global '{}' not found", name))
    }

    fn run_global(source: &str, name: &str) -> Value {
        let interpreter = run(source).expect("program failed");
        global(&interpreter, name)
    }

    fn run_err(source: &str) -> EmberError {
        run(source).expect_err("program should have failed")
    }

    // ── arithmetic, equality, truthiness ───────────────────────────────────

    #[test]
    fn arithmetic_and_grouping() {
        assert_eq!(
            run_global("var r = (1 + 2) * 3 - 4 / 2;", "r"),
            Value::Number(7.0)
        );
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            run_global("var r = \"x\" + \"y\";", "r"),
            Value::String("xy".to_string())
        );
    }

    #[test]
    fn adding_number_and_string_is_a_type_error() {
        let err = run_err("var r = 1 + \"y\";");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Type));
    }

    #[test]
    fn negating_a_string_is_a_type_error() {
        let err = run_err("var r = -\"x\";");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Type));
    }

    #[test]
    fn comparison_operators_require_numbers() {
        assert_eq!(run_global("var r = 2 > 1;", "r"), Value::Bool(true));
        assert_eq!(run_global("var r = 2 <= 1;", "r"), Value::Bool(false));

        let err = run_err("var r = \"a\" < \"b\";");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Type));
    }

    #[test]
    fn division_by_zero_follows_ieee_754() {
        match run_global("var r = 1 / 0;", "r") {
            Value::Number(n) => assert!(n.is_infinite() && n > 0.0),
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn equality_is_total_and_never_cross_kind() {
        assert_eq!(run_global("var r = 1 == 1;", "r"), Value::Bool(true));
        assert_eq!(run_global("var r = null == null;", "r"), Value::Bool(true));
        assert_eq!(run_global("var r = 1 == \"1\";", "r"), Value::Bool(false));
        assert_eq!(run_global("var r = true == 1;", "r"), Value::Bool(false));
        assert_eq!(run_global("var r = null == false;", "r"), Value::Bool(false));
        assert_eq!(run_global("var r = \"a\" != \"b\";", "r"), Value::Bool(true));
    }

    #[test]
    fn only_null_and_false_are_falsy() {
        assert_eq!(run_global("var r = !null;", "r"), Value::Bool(true));
        assert_eq!(run_global("var r = !false;", "r"), Value::Bool(true));
        assert_eq!(run_global("var r = !0;", "r"), Value::Bool(false));
        assert_eq!(run_global("var r = !\"\";", "r"), Value::Bool(false));
    }

    #[test]
    fn logical_operators_yield_raw_operands() {
        assert_eq!(
            run_global("var r = null || \"yes\";", "r"),
            Value::String("yes".to_string())
        );
        assert_eq!(run_global("var r = false && 3;", "r"), Value::Bool(false));
        assert_eq!(run_global("var r = 1 && 2;", "r"), Value::Number(2.0));
        assert_eq!(
            run_global("var r = \"a\" || \"b\";", "r"),
            Value::String("a".to_string())
        );
    }

    #[test]
    fn logical_operators_short_circuit() {
        // the right operand would blow up if evaluated
        assert_eq!(
            run_global("var r = true || missing;", "r"),
            Value::Bool(true)
        );
        assert_eq!(
            run_global("var r = false && missing;", "r"),
            Value::Bool(false)
        );
    }

    // ── variables, scoping, closures ───────────────────────────────────────

    #[test]
    fn shadowed_variable_leaves_outer_binding_unchanged() {
        assert_eq!(
            run_global("var a = 1; { var a = 2; }", "a"),
            Value::Number(1.0)
        );
    }

    #[test]
    fn inner_scope_reads_resolve_lexically() {
        let interpreter = run(
            "var a = \"global\";\n\
             var first;\n\
             var second;\n\
             {\n\
               first = a;\n\
               var a = \"block\";\n\
               second = a;\n\
             }",
        )
        .expect("program failed");

        assert_eq!(
            global(&interpreter, "first"),
            Value::String("global".to_string())
        );
        assert_eq!(
            global(&interpreter, "second"),
            Value::String("block".to_string())
        );
    }

    #[test]
    fn closure_capture_is_fixed_at_resolution_time() {
        // a later shadowing declaration must not change what the closure sees
        let interpreter = run(
            "var a = \"global\";\n\
             var before;\n\
             var after;\n\
             {\n\
               function read() { return a; }\n\
               before = read();\n\
               var a = \"block\";\n\
               after = read();\n\
             }",
        )
        .expect("program failed");

        assert_eq!(
            global(&interpreter, "before"),
            Value::String("global".to_string())
        );
        assert_eq!(
            global(&interpreter, "after"),
            Value::String("global".to_string())
        );
    }

    #[test]
    fn closures_share_mutable_state() {
        let interpreter = run(
            "function makeCounter() {\n\
               var i = 0;\n\
               function inc() { i = i + 1; return i; }\n\
               return inc;\n\
             }\n\
             var c = makeCounter();\n\
             var first = c();\n\
             var second = c();",
        )
        .expect("program failed");

        assert_eq!(global(&interpreter, "first"), Value::Number(1.0));
        assert_eq!(global(&interpreter, "second"), Value::Number(2.0));
    }

    #[test]
    fn assignment_to_undeclared_variable_never_declares() {
        let err = run_err("missing = 1;");
        assert_eq!(
            err.runtime_kind(),
            Some(RuntimeErrorKind::UndefinedVariable)
        );
    }

    #[test]
    fn reading_an_undefined_global_fails_at_runtime() {
        let err = run_err("var r = missing;");
        assert_eq!(
            err.runtime_kind(),
            Some(RuntimeErrorKind::UndefinedVariable)
        );
    }

    // ── control flow ───────────────────────────────────────────────────────

    #[test]
    fn if_else_picks_by_truthiness() {
        assert_eq!(
            run_global("var r; if (0) { r = \"then\"; } else { r = \"else\"; }", "r"),
            Value::String("then".to_string())
        );
        assert_eq!(
            run_global(
                "var r; if (null) { r = \"then\"; } else { r = \"else\"; }",
                "r"
            ),
            Value::String("else".to_string())
        );
    }

    #[test]
    fn while_loop_re_evaluates_its_condition() {
        assert_eq!(
            run_global(
                "var sum = 0; var i = 1; while (i <= 5) { sum = sum + i; i = i + 1; }",
                "sum"
            ),
            Value::Number(15.0)
        );
    }

    #[test]
    fn for_loop_runs_header_clauses() {
        assert_eq!(
            run_global(
                "var sum = 0; for (var i = 1; i <= 4; i = i + 1) { sum = sum + i; }",
                "sum"
            ),
            Value::Number(10.0)
        );
    }

    #[test]
    fn return_unwinds_through_loops_and_blocks() {
        assert_eq!(
            run_global(
                "function find() {\n\
                   var i = 0;\n\
                   while (true) {\n\
                     i = i + 1;\n\
                     if (i > 3) { return i; }\n\
                   }\n\
                 }\n\
                 var r = find();",
                "r"
            ),
            Value::Number(4.0)
        );
    }

    #[test]
    fn function_without_return_yields_null() {
        assert_eq!(
            run_global("function noop() {} var r = noop();", "r"),
            Value::Null
        );
    }

    #[test]
    fn recursion_works() {
        assert_eq!(
            run_global(
                "function fib(n) {\n\
                   if (n < 2) { return n; }\n\
                   return fib(n - 1) + fib(n - 2);\n\
                 }\n\
                 var r = fib(10);",
                "r"
            ),
            Value::Number(55.0)
        );
    }

    // ── calls and arity ────────────────────────────────────────────────────

    #[test]
    fn calling_with_wrong_arity_fails() {
        let err = run_err("function zero() { return 0; } zero(1);");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Arity));
    }

    #[test]
    fn calling_a_number_fails_with_not_callable() {
        let err = run_err("var n = 5; n();");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::NotCallable));
    }

    #[test]
    fn constructor_arity_mismatch_fails() {
        let err = run_err("class P { init(a, b) {} } P(1);");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Arity));
    }

    #[test]
    fn clock_is_preregistered() {
        let interpreter = run("var t = clock(); var ok = t > 0;").expect("program failed");

        assert!(matches!(
            global(&interpreter, "clock"),
            Value::NativeFunction { .. }
        ));
        assert_eq!(global(&interpreter, "ok"), Value::Bool(true));
    }

    // ── classes, instances, inheritance ────────────────────────────────────

    #[test]
    fn instance_fields_are_created_on_first_assignment() {
        assert_eq!(
            run_global("class Bag {} var b = Bag(); b.item = 7; var r = b.item;", "r"),
            Value::Number(7.0)
        );
    }

    #[test]
    fn fields_shadow_methods() {
        assert_eq!(
            run_global(
                "class C { name() { return \"method\"; } }\n\
                 var c = C();\n\
                 c.name = \"field\";\n\
                 var r = c.name;",
                "r"
            ),
            Value::String("field".to_string())
        );
    }

    #[test]
    fn methods_see_this() {
        assert_eq!(
            run_global(
                "class Counter {\n\
                   init() { this.count = 0; }\n\
                   increment() { this.count = this.count + 1; return this.count; }\n\
                 }\n\
                 var c = Counter();\n\
                 c.increment();\n\
                 c.increment();\n\
                 var r = c.increment();",
                "r"
            ),
            Value::Number(3.0)
        );
    }

    #[test]
    fn extracted_methods_stay_bound() {
        assert_eq!(
            run_global(
                "class Speaker {\n\
                   init(n) { this.n = n; }\n\
                   speak() { return this.n; }\n\
                 }\n\
                 var s = Speaker(\"hi\");\n\
                 var m = s.speak;\n\
                 var r = m();",
                "r"
            ),
            Value::String("hi".to_string())
        );
    }

    #[test]
    fn methods_are_inherited() {
        assert_eq!(
            run_global(
                "class A { m() { return 1; } } class B < A {} var r = B().m();",
                "r"
            ),
            Value::Number(1.0)
        );
    }

    #[test]
    fn super_dispatch_is_static() {
        assert_eq!(
            run_global(
                "class A { greet() { return \"A\"; } }\n\
                 class B < A { greet() { return super.greet() + \"B\"; } }\n\
                 var r = B().greet();",
                "r"
            ),
            Value::String("AB".to_string())
        );
    }

    #[test]
    fn super_skips_the_dynamic_class() {
        // C inherits B's greet; its super must still be A's, not B's
        assert_eq!(
            run_global(
                "class A { greet() { return \"A\"; } }\n\
                 class B < A { greet() { return super.greet() + \"B\"; } }\n\
                 class C < B { greet() { return super.greet() + \"C\"; } }\n\
                 var r = C().greet();",
                "r"
            ),
            Value::String("ABC".to_string())
        );
    }

    #[test]
    fn missing_super_method_is_an_undefined_property() {
        let err = run_err(
            "class A {} class B < A { m() { return super.missing(); } } B().m();",
        );
        assert_eq!(
            err.runtime_kind(),
            Some(RuntimeErrorKind::UndefinedProperty)
        );
    }

    #[test]
    fn inheriting_from_a_non_class_fails() {
        let err = run_err("var NotAClass = 3; class D < NotAClass {}");
        assert_eq!(
            err.runtime_kind(),
            Some(RuntimeErrorKind::InvalidSuperclass)
        );
    }

    #[test]
    fn bare_return_in_initializer_still_yields_the_instance() {
        let interpreter = run(
            "class F { init() { this.ready = true; return; } }\n\
             var f = F();\n\
             var r = f.ready;",
        )
        .expect("program failed");

        assert!(matches!(global(&interpreter, "f"), Value::Instance(_)));
        assert_eq!(global(&interpreter, "r"), Value::Bool(true));
    }

    #[test]
    fn explicit_initializer_return_value_is_discarded() {
        let interpreter =
            run("class G { init() { return 42; } } var g = G();").expect("program failed");

        assert!(matches!(global(&interpreter, "g"), Value::Instance(_)));
    }

    #[test]
    fn reinvoking_init_directly_returns_this() {
        let interpreter = run(
            "class G { init() {} }\n\
             var g = G();\n\
             var h = g.init();",
        )
        .expect("program failed");

        // `init` called as a method still yields the receiving instance
        assert_eq!(global(&interpreter, "g"), global(&interpreter, "h"));
    }

    #[test]
    fn reading_a_missing_property_fails_identically_each_time() {
        let source = "class P {} var p = P(); var r = p.missing;";

        let first = run_err(source);
        let second = run_err(source);

        assert_eq!(
            first.runtime_kind(),
            Some(RuntimeErrorKind::UndefinedProperty)
        );
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn property_access_on_non_instances_fails() {
        let err = run_err("var n = 3; var r = n.field;");
        assert_eq!(err.runtime_kind(), Some(RuntimeErrorKind::Type));
    }

    #[test]
    fn instances_compare_by_identity() {
        let interpreter = run(
            "class C {}\n\
             var a = C();\n\
             var b = C();\n\
             var same = a == a;\n\
             var different = a == b;",
        )
        .expect("program failed");

        assert_eq!(global(&interpreter, "same"), Value::Bool(true));
        assert_eq!(global(&interpreter, "different"), Value::Bool(false));
    }

    // ── value rendering ────────────────────────────────────────────────────

    #[test]
    fn values_render_like_the_print_statement() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(3.14).to_string(), "3.14");
        assert_eq!(Value::Number(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::String("hi".to_string()).to_string(), "hi");
    }

    #[test]
    fn classes_and_instances_render_by_name() {
        let interpreter = run("class C {} var c = C();").expect("program failed");

        assert_eq!(global(&interpreter, "C").to_string(), "C");
        assert_eq!(global(&interpreter, "c").to_string(), "C instance");
    }

    #[test]
    fn functions_render_by_name() {
        let interpreter = run("function f() {}").expect("program failed");

        assert_eq!(global(&interpreter, "f").to_string(), "<function f>");
    }
}
