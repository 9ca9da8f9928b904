use llang::parser::ast::{BinaryOp, Decl, Document, ExprKind, Stmt, UnaryOp};
use llang::types::Type;

fn parse(source: &str) -> Document {
    let tokens = llang::lexer::lex(source).expect("lex should succeed");
    let mut parser = llang::parser::Parser::new(tokens);
    parser.parse_document().expect("parse should succeed")
}

fn first_body(document: &Document) -> &[Stmt] {
    match &document.items[0] {
        Decl::Function(function) => &function.body.stmts,
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn parses_function_prototype() {
    let document = parse("function add(a: i64, b: str): f32 { return 1.0; }");
    let Decl::Function(function) = &document.items[0] else {
        panic!("expected function");
    };
    assert_eq!(function.proto.name, "add");
    assert_eq!(function.proto.params.len(), 2);
    assert_eq!(function.proto.params[0].ty, Type::Int(64));
    assert_eq!(function.proto.params[1].ty, Type::pointer_to(Type::Int(8)));
    assert_eq!(function.proto.return_type, Type::Float(32));
}

#[test]
fn missing_return_type_means_void() {
    let document = parse("extern function puts(s: str)\nfunction main() {}");
    match &document.items[0] {
        Decl::Extern(decl) => assert_eq!(decl.proto.return_type, Type::Void),
        other => panic!("expected extern, got {:?}", other),
    }
}

#[test]
fn parses_struct_and_pointer_types() {
    let document = parse("struct P { x: i64; next: P**; }");
    let Decl::Struct(proto) = &document.items[0] else {
        panic!("expected struct");
    };
    assert_eq!(proto.fields[0].name, "x");
    assert_eq!(
        proto.fields[1].ty,
        Type::pointer_to(Type::pointer_to(Type::Struct("P".to_string())))
    );
    assert_eq!(proto.field("next").map(|(index, _)| index), Some(1));
}

#[test]
fn rejects_duplicate_struct_fields() {
    let tokens = llang::lexer::lex("struct P { x: i64; x: f64; }").expect("lex should succeed");
    let err = llang::parser::Parser::new(tokens)
        .parse_document()
        .expect_err("parse should fail");
    assert!(err.message.contains("duplicate field 'x'"));
}

#[test]
fn parses_import() {
    let document = parse("import \"lib.ll\";");
    match &document.items[0] {
        Decl::Import(import) => {
            assert_eq!(import.path, "lib.ll");
            assert!(import.document.is_none());
        }
        other => panic!("expected import, got {:?}", other),
    }
}

#[test]
fn respects_operator_precedence() {
    let document = parse("function f() { a + b * c < d }");
    let Stmt::Expr(expr) = &first_body(&document)[0] else {
        panic!("expected expression statement");
    };
    let ExprKind::Binary { lhs, op, .. } = &expr.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::Lt);
    match &lhs.kind {
        ExprKind::Binary { op, rhs, .. } => {
            assert_eq!(*op, BinaryOp::Add);
            assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
        }
        other => panic!("expected addition, got {:?}", other),
    }
}

#[test]
fn assignment_is_right_associative() {
    let document = parse("function f() { a = b = 1 }");
    let Stmt::Expr(expr) = &first_body(&document)[0] else {
        panic!("expected expression statement");
    };
    let ExprKind::Assign { value, .. } = &expr.kind else {
        panic!("expected assignment");
    };
    assert!(matches!(value.kind, ExprKind::Assign { .. }));
}

#[test]
fn arrow_desugars_to_deref_dot() {
    let document = parse("function f() { p->x = 1; }");
    let Stmt::Expr(expr) = &first_body(&document)[0] else {
        panic!("expected expression statement");
    };
    let ExprKind::Assign { target, .. } = &expr.kind else {
        panic!("expected assignment");
    };
    let ExprKind::Dot { lhs, field } = &target.kind else {
        panic!("expected dot");
    };
    assert_eq!(field, "x");
    assert!(matches!(
        lhs.kind,
        ExprKind::Unary {
            op: UnaryOp::Deref,
            ..
        }
    ));
}

#[test]
fn parses_control_flow() {
    let document = parse(
        "function f(n: i64) {
            if (n < 1) { return; } else if (n == 1) { n = 2 } else { n = 3 }
            while (n > 0) { n = n - 1; }
            for (let i: i64 = 0; i < n; i = i + 1) { g(i) }
        }",
    );
    let body = first_body(&document);
    match &body[0] {
        Stmt::If {
            branches,
            else_block,
            ..
        } => {
            assert_eq!(branches.len(), 2);
            assert!(else_block.is_some());
        }
        other => panic!("expected if, got {:?}", other),
    }
    assert!(matches!(body[1], Stmt::While { .. }));
    match &body[2] {
        Stmt::For { init, .. } => assert!(matches!(**init, Stmt::Let { .. })),
        other => panic!("expected for, got {:?}", other),
    }
}

#[test]
fn parses_struct_literal_and_index() {
    let document = parse("function f(p: P*) { let q: P = P { x: 1, y: p[2].y } }");
    let Stmt::Let { init: Some(init), .. } = &first_body(&document)[0] else {
        panic!("expected let with initializer");
    };
    let ExprKind::StructLiteral { name, fields } = &init.kind else {
        panic!("expected struct literal");
    };
    assert_eq!(name, "P");
    assert_eq!(fields.len(), 2);
    assert!(matches!(fields[1].value.kind, ExprKind::Dot { .. }));
}

#[test]
fn rejects_invalid_assignment_target() {
    let tokens = llang::lexer::lex("function f() { 1 = 2 }").expect("lex should succeed");
    let err = llang::parser::Parser::new(tokens)
        .parse_document()
        .expect_err("parse should fail");
    assert_eq!(err.message, "invalid assignment target");
}

#[test]
fn spans_cover_whole_expression() {
    let source = "function f() { foo(1, 2) }";
    let document = parse(source);
    let Stmt::Expr(expr) = &first_body(&document)[0] else {
        panic!("expected expression statement");
    };
    let file = llang::source::SourceFile::new("t.ll", source);
    assert_eq!(file.slice(expr.span), "foo(1, 2)");
}
