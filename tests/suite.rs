//! End-to-end tests driving the whole pipeline through
//! [Context::compile_and_execute], the same way the shell does.

use quill::{Context, Logger, Val};

fn ctx() -> Context {
    Context::new(true, Logger::silent()).unwrap()
}

/// Runs every expression in `src` and returns the last value.
fn run(ctx: &Context, src: &str) -> Val {
    let results = ctx.compile_and_execute(src).unwrap();
    results.last().expect("expected at least one result").output.clone()
}

fn run_str(ctx: &Context, src: &str) -> String {
    run(ctx, src).to_string()
}

#[test]
fn arithmetic() {
    let ctx = ctx();
    assert_eq!(run(&ctx, "(+ 1 2)"), Val::I64(3));
    assert_eq!(run(&ctx, "(+ 1 2 3 4)"), Val::I64(10));
    assert_eq!(run(&ctx, "(- 10 4 1)"), Val::I64(5));
    assert_eq!(run(&ctx, "(- 3)"), Val::I64(-3));
    assert_eq!(run(&ctx, "(* 2 3 4)"), Val::I64(24));
    assert_eq!(run(&ctx, "(/ 7 2)"), Val::I64(3));
    assert_eq!(run(&ctx, "(mod 7 3)"), Val::I64(1));
    // Integer operands keep an integer result; a float promotes.
    assert_eq!(run(&ctx, "(+ 1 2.5)"), Val::F64(3.5));
    assert_eq!(run(&ctx, "(* 2.0 3)"), Val::F64(6.0));
    assert_eq!(run(&ctx, "(< 1 2 3)"), Val::Bool(true));
    assert_eq!(run(&ctx, "(< 1 3 2)"), Val::Bool(false));
    assert_eq!(run(&ctx, "(= 2 2.0)"), Val::Bool(true));
}

#[test]
fn while_loops_mutate_globals() {
    let ctx = ctx();
    assert_eq!(
        run(
            &ctx,
            "(begin (set! x 0) (while (< x 5) (set! x (+ x 1))) x)"
        ),
        Val::I64(5)
    );
}

#[test]
fn dotted_parameters_collect_rest_arguments() {
    let ctx = ctx();
    assert_eq!(run_str(&ctx, "((lambda (a . b) b) 5 6 7 8)"), "(6 7 8)");
    assert_eq!(run_str(&ctx, "((lambda all all) 1 2)"), "(1 2)");
}

#[test]
fn backquote_splicing() {
    let ctx = ctx();
    assert_eq!(
        run_str(&ctx, "`((list 1 2) ,(list 1 2) ,@(list 1 2))"),
        "((list 1 2) (1 2) 1 2)"
    );
    assert_eq!(run_str(&ctx, "`(a b)"), "(a b)");
    assert_eq!(run_str(&ctx, "`(1 ,(+ 1 1) 3)"), "(1 2 3)");
}

#[test]
fn macros_expand_at_compile_time() {
    let ctx = ctx();
    assert_eq!(
        run(
            &ctx,
            "(begin (defmacro inc1 (x) `(+ ,x 1)) (inc1 (inc1 1)))"
        ),
        Val::I64(3)
    );
}

#[test]
fn recursive_functions() {
    let ctx = ctx();
    assert_eq!(
        run(
            &ctx,
            "(set! fact (lambda (x) (if (<= x 1) 1 (* x (fact (- x 1)))))) (fact 5)"
        ),
        Val::I64(120)
    );
}

#[test]
fn tail_calls_do_not_grow_the_stack() {
    let ctx = ctx();
    let out = run(
        &ctx,
        "(define (loop n) (if (= n 0) 'ok (loop (- n 1)))) (loop 100000)",
    );
    assert_eq!(out.to_string(), "ok");
}

#[test]
fn closures_share_their_captured_environment() {
    let ctx = ctx();
    let src = "
      (define (make-counter)
        (let ((sum 0))
          (lambda (d) (set! sum (+ sum d)) sum)))
      (define c (make-counter))
      (c 5)";
    assert_eq!(run(&ctx, src), Val::I64(5));
    assert_eq!(run(&ctx, "(c 6)"), Val::I64(11));
    // A second counter has its own state.
    assert_eq!(run(&ctx, "((make-counter) 1)"), Val::I64(1));
}

#[test]
fn print_and_reread_round_trips() {
    let ctx = ctx();
    for src in [
        "()",
        "#t",
        "#f",
        "42",
        "-7",
        "2.5",
        "5.0",
        "\"hello\\nworld\"",
        "'sym",
        "'(1 2.0 \"three\" four (5))",
    ] {
        let value = run(&ctx, src);
        let reread = run(&ctx, &value.to_string());
        assert!(
            value.structural_eq(&reread),
            "{} printed as {} but reread as {}",
            src,
            value,
            reread
        );
    }
}

#[test]
fn eval_of_a_quoted_form_is_the_form() {
    let ctx = ctx();
    assert_eq!(run(&ctx, "(eval (quote (+ 1 2)))"), Val::I64(3));
    assert_eq!(
        run(&ctx, "(equal? (eval '(list 1 2)) (list 1 2))"),
        Val::Bool(true)
    );
}

#[test]
fn reverse_laws() {
    let ctx = ctx();
    assert_eq!(
        run(&ctx, "(= (length '(1 2 3)) (length (reverse '(1 2 3))))"),
        Val::Bool(true)
    );
    assert_eq!(
        run(&ctx, "(equal? (reverse (reverse '(1 2 3))) '(1 2 3))"),
        Val::Bool(true)
    );
}

#[test]
fn truthiness_in_conditionals() {
    let ctx = ctx();
    // nil and #f are false at runtime; everything else is true.
    assert_eq!(run(&ctx, "(if () 1 2)"), Val::I64(2));
    assert_eq!(run(&ctx, "(if #f 1 2)"), Val::I64(2));
    assert_eq!(run(&ctx, "(if 0 1 2)"), Val::I64(1));
    assert_eq!(run(&ctx, "(if \"\" 1 2)"), Val::I64(1));
    // if* returns the predicate value itself when truthy.
    assert_eq!(run(&ctx, "(if* 0 2)"), Val::I64(0));
    assert_eq!(run(&ctx, "(if* () 2)"), Val::I64(2));
    assert_eq!(run(&ctx, "(if* #f 2)"), Val::I64(2));
}

#[test]
fn if_without_else_yields_nil() {
    let ctx = ctx();
    assert_eq!(run(&ctx, "(set! flag ()) (if flag 1)"), Val::Nil);
}

#[test]
fn vectors_and_maps() {
    let ctx = ctx();
    assert_eq!(run_str(&ctx, "(vector 1 2 3)"), "[Vector 1 2 3]");
    assert_eq!(
        run(
            &ctx,
            "(set! v (make-vector 2 0)) (vector-set! v 1 9) (vector-get v 1)"
        ),
        Val::I64(9)
    );
    assert_eq!(run(&ctx, "(vector-length (vector 1 2))"), Val::I64(2));

    assert_eq!(run_str(&ctx, "{1 2}"), "{1 2}");
    assert_eq!(run(&ctx, "(map-get {\"k\" 5} \"k\")"), Val::I64(5));
    assert_eq!(run(&ctx, "(map-get {} \"k\" 7)"), Val::I64(7));
    assert_eq!(
        run(&ctx, "(map-get (map-set {} \"k\" 1) \"k\")"),
        Val::I64(1)
    );
    // map-set leaves the original untouched.
    assert_eq!(
        run(&ctx, "(set! m {}) (map-set m 1 2) (map-length m)"),
        Val::I64(0)
    );
    assert_eq!(run(&ctx, "(map-has? {1 2} 1)"), Val::Bool(true));
}

#[test]
fn strings() {
    let ctx = ctx();
    assert_eq!(run(&ctx, "(string-length \"héllo\")"), Val::I64(5));
    assert_eq!(run(&ctx, "(symbol->string 'foo)"), Val::string("foo"));
    assert_eq!(
        run(&ctx, "(eq? (string->symbol \"foo\") 'foo)"),
        Val::Bool(true)
    );
    assert_eq!(
        run(&ctx, "(string-append \"a\" \"b\" \"c\")"),
        Val::string("abc")
    );
    assert_eq!(run(&ctx, "(substring \"hello\" 1 3)"), Val::string("ell"));
    assert_eq!(run(&ctx, "(string->number \"42\")"), Val::I64(42));
    assert_eq!(run(&ctx, "(string->number \"2.5\")"), Val::F64(2.5));
    assert_eq!(run(&ctx, "(string->number \"nope\")"), Val::Nil);
    assert_eq!(run(&ctx, "(number->string 42)"), Val::string("42"));
}

#[test]
fn printed_forms_of_opaque_values() {
    let ctx = ctx();
    assert_eq!(
        run_str(&ctx, "(set! named (lambda (x) x)) named"),
        "[Closure/named]"
    );
    assert_eq!(run_str(&ctx, "(lambda (x) x)"), "[Closure]");
    assert_eq!(run_str(&ctx, "(native-box 5)"), "[Native integer 5]");
    assert_eq!(run(&ctx, "(native-type (native-box 5))"), Val::string("integer"));
}

#[test]
fn packages_scope_their_bindings() {
    let ctx = ctx();
    assert_eq!(run(&ctx, "(package-get)"), Val::Nil);
    let out = run(
        &ctx,
        "(package-set \"mypkg\") (set! val 41) (package-set ()) mypkg:val",
    );
    assert_eq!(out, Val::I64(41));
    assert_eq!(run(&ctx, "(package-get)"), Val::Nil);
}

#[test]
fn imports_expose_exported_bindings() {
    let ctx = ctx();
    run(&ctx, "(package-set \"aux\") (set! shared 7) (package-set ())");
    // Not visible until global imports aux.
    assert_eq!(run(&ctx, "shared"), Val::Nil);
    assert_eq!(run(&ctx, "(package-import \"aux\") shared"), Val::I64(7));
}

#[test]
fn macroexpand_primitives() {
    let ctx = ctx();
    run(&ctx, "(defmacro twice6 (x) `(+ ,x ,x))");
    assert_eq!(run_str(&ctx, "(macroexpand-1 '(twice6 3))"), "(+ 3 3)");
    // One step only, and idempotent on non-macro heads.
    assert_eq!(run_str(&ctx, "(macroexpand-1 '(foo 1))"), "(foo 1)");
    assert_eq!(
        run_str(&ctx, "(macroexpand '(twice6 (twice6 2)))"),
        "(+ (+ 2 2) (+ 2 2))"
    );
}

#[test]
fn error_kinds_are_distinguished() {
    let ctx = ctx();
    let kind = |src: &str| ctx.compile_and_execute(src).unwrap_err().kind();

    assert_eq!(kind(")"), "parse");
    assert_eq!(kind("(set! 5 1)"), "compile");
    assert_eq!(kind("(first 5)"), "language");
    assert_eq!(kind("(5 6)"), "language");
    assert_eq!(kind("(error \"boom\")"), "runtime");
    assert_eq!(kind("(native-type 5)"), "interop");

    // A macro body failure surfaces as a compile error.
    run(&ctx, "(defmacro broken () (error \"inside\"))");
    assert_eq!(kind("(broken)"), "compile");
}

#[test]
fn runtime_errors_carry_their_message() {
    let ctx = ctx();
    let err = ctx.compile_and_execute("(error \"boom\" 42)").unwrap_err();
    assert_eq!(err.to_string(), "error: boom 42");
}

#[test]
fn gensyms_never_collide() {
    let ctx = ctx();
    assert_eq!(run(&ctx, "(eq? (gensym) (gensym))"), Val::Bool(false));
}

#[test]
fn higher_order_primitives() {
    let ctx = ctx();
    assert_eq!(
        run_str(&ctx, "(map (lambda (x) (* x x)) '(1 2 3))"),
        "(1 4 9)"
    );
    assert_eq!(run(&ctx, "(apply + '(1 2 3))"), Val::I64(6));
    assert_eq!(run(&ctx, "(fold * 1 '(1 2 3 4))"), Val::I64(24));
}

#[test]
fn derived_conditionals() {
    let ctx = ctx();
    assert_eq!(
        run(&ctx, "(cond (#f 1) ((= 1 1) 2) (#t 3))"),
        Val::I64(2)
    );
    assert_eq!(run(&ctx, "(cond (#f 1) (#f 2))"), Val::Nil);
    assert_eq!(run(&ctx, "(and 1 2 3)"), Val::I64(3));
    assert_eq!(run(&ctx, "(and 1 #f 3)"), Val::Bool(false));
    assert_eq!(run(&ctx, "(or #f () 7)"), Val::I64(7));
    assert_eq!(run(&ctx, "(or 1 (error \"never evaluated\"))"), Val::I64(1));
    // Short-circuiting: the unreached arm must not run.
    assert_eq!(
        run(&ctx, "(and #f (error \"never evaluated\"))"),
        Val::Bool(false)
    );
}

#[test]
fn assoc_searches_pair_lists() {
    let ctx = ctx();
    assert_eq!(run_str(&ctx, "(assoc 2 '((1 a) (2 b)))"), "(2 b)");
    assert_eq!(run(&ctx, "(assoc 9 '((1 a)))"), Val::Nil);
}

#[test]
fn shadowing_a_primitive_name_disables_the_fast_path() {
    let ctx = ctx();
    // Inside the lambda, `+` is a local bound to a closure that subtracts.
    assert_eq!(
        run(&ctx, "((lambda (+) (+ 10 4)) (lambda (a b) (- a b)))"),
        Val::I64(6)
    );
    // Outside, the primitive is untouched.
    assert_eq!(run(&ctx, "(+ 10 4)"), Val::I64(14));
}

#[test]
fn while_yields_its_last_body_value() {
    let ctx = ctx();
    assert_eq!(
        run(&ctx, "(set! n 0) (while (< n 3) (set! n (+ n 1)) (* n 10))"),
        Val::I64(30)
    );
    // A loop whose predicate is false from the start yields nil.
    assert_eq!(run(&ctx, "(while #f 1)"), Val::Nil);
}

#[test]
fn mutual_recursion_in_tail_position() {
    let ctx = ctx();
    let src = "
      (define (even? n) (if (= n 0) #t (odd? (- n 1))))
      (define (odd? n) (if (= n 0) #f (even? (- n 1))))
      (even? 50001)";
    assert_eq!(run(&ctx, src), Val::Bool(false));
}

#[test]
fn macros_can_define_other_bindings() {
    let ctx = ctx();
    let src = "
      (defmacro defconst (name value)
        `(begin (set! ,name ,value) ',name))
      (defconst answer 42)
      answer";
    assert_eq!(run(&ctx, src), Val::I64(42));
}

#[test]
fn gensym_builds_capture_free_expansions() {
    let ctx = ctx();
    // The macro binds a temporary that cannot collide with user names.
    let src = "
      (defmacro swap-results (a b)
        (let ((tmp (gensym)))
          `(let ((,tmp ,a))
             (list ,b ,tmp))))
      (swap-results 1 2)";
    assert_eq!(run(&ctx, src).to_string(), "(2 1)");
}

#[test]
fn nested_loops() {
    let ctx = ctx();
    let src = "
      (set! total 0)
      (set! i 0)
      (while (< i 3)
        (set! j 0)
        (while (< j 3)
          (set! total (+ total 1))
          (set! j (+ j 1)))
        (set! i (+ i 1)))
      total";
    assert_eq!(run(&ctx, src), Val::I64(9));
}

#[test]
fn apply_spreads_list_arguments() {
    let ctx = ctx();
    assert_eq!(run_str(&ctx, "(apply list '(1 2))"), "(1 2)");
    assert_eq!(
        run(&ctx, "(apply (lambda (a b c) (+ a (* b c))) '(1 2 3))"),
        Val::I64(7)
    );
}

#[test]
fn logger_receives_instruction_dumps() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let logger = Logger::new(Box::new(move |args| sink.borrow_mut().push(args.to_string())));
    logger.instructions.set(true);

    let ctx = Context::new(false, logger).unwrap();
    seen.borrow_mut().clear();

    ctx.compile_and_execute("(+ 1 2)").unwrap();
    let dump = seen.borrow().join("\n");
    assert!(dump.contains("CALL_PRIMOP"), "got: {}", dump);
    assert!(dump.contains("RETURN"));
}

#[test]
fn logger_receives_machine_traces() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let logger = Logger::new(Box::new(move |args| sink.borrow_mut().push(args.to_string())));

    let ctx = Context::new(false, logger).unwrap();
    ctx.logger.stack.set(true);
    ctx.compile_and_execute("5").unwrap();

    let trace = seen.borrow().join("\n");
    assert!(trace.contains("PUSH_CONST"), "got: {}", trace);
    assert!(trace.contains("MAKE_ENV"));
}

#[test]
fn list_mutation() {
    let ctx = ctx();
    assert_eq!(
        run_str(&ctx, "(set! p (cons 1 2)) (set-first! p 9) p"),
        "(9 . 2)"
    );
    assert_eq!(run_str(&ctx, "(set-rest! p ()) p"), "(9)");
    assert_eq!(run_str(&ctx, "(append '(1) '(2 3) '(4))"), "(1 2 3 4)");
    assert_eq!(run(&ctx, "(nth '(4 5 6) 1)"), Val::I64(5));
}
