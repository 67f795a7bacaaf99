//! Static-resolution tests: every program here must be classified *before*
//! anything executes — either rejected with accumulated `Resolve` errors or
//! admitted untouched.

#[cfg(test)]
mod resolver_tests {
    use ember_lang as ember;

    use ember::error::{EmberError, RuntimeErrorKind};
    use ember::interpreter::Interpreter;
    use ember::parser::Parser;
    use ember::resolver::Resolver;
    use ember::scanner::Scanner;
    use ember::stmt::Stmt;
    use ember::token::Token;

    fn parse(source: &str) -> Vec<Stmt> {
        let tokens: Vec<Token> = Scanner::new(source.as_bytes())
            .collect::<Result<_, _>>()
            .expect("scan failed");

        let mut parser = Parser::new(&tokens);
        parser.parse().expect("parse failed")
    }

    /// Runs the resolve pass only; returns the accumulated errors (empty on
    /// success).
    fn resolve_errors(source: &str) -> Vec<EmberError> {
        let statements = parse(source);
        let mut interpreter = Interpreter::new();

        match Resolver::new(&mut interpreter).resolve(&statements) {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        }
    }

    fn assert_single_resolve_error(source: &str, fragment: &str) {
        let errors = resolve_errors(source);

        assert_eq!(errors.len(), 1, "expected exactly one error, got {:?}", errors);
        assert!(
            matches!(errors[0], EmberError::Resolve { .. }),
            "expected a Resolve error, got {:?}",
            errors[0]
        );
        assert!(
            errors[0].to_string().contains(fragment),
            "expected message containing '{}', got '{}'",
            fragment,
            errors[0]
        );
    }

    #[test]
    fn self_referential_initializer_in_block_is_rejected() {
        assert_single_resolve_error(
            "{ var a = a; }",
            "Cannot read local variable in its own initializer",
        );
    }

    #[test]
    fn self_referential_initializer_at_top_level_is_deferred_to_runtime() {
        // global lookups are deferred: no resolve error, but evaluation fails
        // with UndefinedVariable
        let source = "var a = a;";
        assert!(resolve_errors(source).is_empty());

        let statements = parse(source);
        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter)
            .resolve(&statements)
            .expect("resolve should succeed");

        let err = interpreter
            .interpret(&statements)
            .expect_err("evaluation should fail");
        assert_eq!(
            err.runtime_kind(),
            Some(RuntimeErrorKind::UndefinedVariable)
        );
    }

    #[test]
    fn return_outside_function_is_rejected() {
        assert_single_resolve_error("return 1;", "'return' used outside of function");
    }

    #[test]
    fn return_inside_function_is_fine() {
        assert!(resolve_errors("function f() { return 1; }").is_empty());
    }

    #[test]
    fn return_inside_method_is_fine() {
        assert!(resolve_errors("class C { m() { return 1; } }").is_empty());
    }

    #[test]
    fn return_with_value_inside_initializer_is_not_a_resolve_error() {
        // the runtime discards the value and yields `this` instead
        assert!(resolve_errors("class C { init() { return 42; } }").is_empty());
    }

    #[test]
    fn this_outside_class_is_rejected() {
        assert_single_resolve_error("print this;", "Cannot use 'this' outside of a class");
    }

    #[test]
    fn this_in_free_function_is_rejected() {
        assert_single_resolve_error(
            "function f() { return this; }",
            "Cannot use 'this' outside of a class",
        );
    }

    #[test]
    fn super_outside_class_is_rejected() {
        assert_single_resolve_error(
            "print super.m;",
            "Cannot use 'super' outside of a class",
        );
    }

    #[test]
    fn super_without_superclass_is_rejected() {
        assert_single_resolve_error(
            "class C { m() { return super.m(); } }",
            "Cannot use 'super' in a class with no superclass",
        );
    }

    #[test]
    fn super_with_superclass_is_fine() {
        let source = "class A { m() { return 1; } } class B < A { m() { return super.m(); } }";
        assert!(resolve_errors(source).is_empty());
    }

    #[test]
    fn class_inheriting_from_itself_is_rejected() {
        assert_single_resolve_error("class A < A {}", "A class cannot inherit from itself");
    }

    #[test]
    fn duplicate_declaration_in_same_scope_is_rejected() {
        assert_single_resolve_error(
            "{ var a = 1; var a = 2; }",
            "Variable already declared in this scope",
        );
    }

    #[test]
    fn duplicate_declaration_at_top_level_is_allowed() {
        // globals may be redefined freely (interactive rebinding)
        assert!(resolve_errors("var a = 1; var a = 2;").is_empty());
    }

    #[test]
    fn shadowing_in_nested_scope_is_allowed() {
        assert!(resolve_errors("var a = 1; { var a = 2; }").is_empty());
    }

    #[test]
    fn errors_are_accumulated_not_short_circuited() {
        let errors = resolve_errors("return 1; { var a = a; } print this;");

        assert_eq!(errors.len(), 3, "expected all three errors, got {:?}", errors);
        for error in &errors {
            assert!(matches!(error, EmberError::Resolve { .. }));
        }
    }

    #[test]
    fn parameters_are_visible_in_function_body() {
        assert!(resolve_errors("function f(x) { return x + 1; }").is_empty());
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        assert_single_resolve_error(
            "function f(x, x) { return x; }",
            "Variable already declared in this scope",
        );
    }

    #[test]
    fn resolution_errors_prevent_evaluation() {
        // fail closed: the invalid `return` must stop the print from running,
        // so the global `a` is never defined
        let source = "var a = 1; return 0;";
        let statements = parse(source);
        let mut interpreter = Interpreter::new();

        let result = Resolver::new(&mut interpreter).resolve(&statements);
        assert!(result.is_err());

        // nothing was evaluated, so `a` must be absent from the globals
        assert!(interpreter.globals.borrow().get("a", 1).is_err());
    }
}
