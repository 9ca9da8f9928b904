use llang::lexer::token::TokenKind;
use llang::source::Span;

#[test]
fn lexes_let_declaration() {
    let tokens = llang::lexer::lex("let x: i64 = 42;").expect("lex should succeed");
    assert_eq!(tokens[0].kind, TokenKind::Let);
    assert!(matches!(tokens[1].kind, TokenKind::Identifier(_)));
    assert_eq!(tokens[2].kind, TokenKind::Colon);
    assert_eq!(tokens[3].kind, TokenKind::Identifier("i64".to_string()));
    assert_eq!(tokens[4].kind, TokenKind::Equal);
    assert_eq!(tokens[5].kind, TokenKind::Int(42));
    assert_eq!(tokens[6].kind, TokenKind::Semicolon);
    assert_eq!(tokens[7].kind, TokenKind::Eof);
}

#[test]
fn lexes_float_and_comparison() {
    let tokens = llang::lexer::lex("pi >= 3.25").expect("lex should succeed");
    assert_eq!(tokens[1].kind, TokenKind::GreaterEqual);
    assert_eq!(tokens[2].kind, TokenKind::Float(3.25));
}

#[test]
fn lexes_pointer_operators() {
    let tokens = llang::lexer::lex("p->x = *q + &r[0]").expect("lex should succeed");
    let kinds = tokens.iter().map(|t| t.kind.clone()).collect::<Vec<_>>();
    assert_eq!(kinds[1], TokenKind::Arrow);
    assert_eq!(kinds[4], TokenKind::Star);
    assert_eq!(kinds[7], TokenKind::Ampersand);
    assert_eq!(kinds[9], TokenKind::LeftBracket);
}

#[test]
fn lexes_keywords() {
    let tokens = llang::lexer::lex("function extern struct import let return if else while for")
        .expect("lex should succeed");
    let expected = [
        TokenKind::Function,
        TokenKind::Extern,
        TokenKind::Struct,
        TokenKind::Import,
        TokenKind::Let,
        TokenKind::Return,
        TokenKind::If,
        TokenKind::Else,
        TokenKind::While,
        TokenKind::For,
    ];
    for (token, kind) in tokens.iter().zip(expected.iter()) {
        assert_eq!(&token.kind, kind);
    }
}

#[test]
fn lexes_string_escapes() {
    let tokens = llang::lexer::lex("\"a\\tb\\n\"").expect("lex should succeed");
    assert_eq!(tokens[0].kind, TokenKind::String("a\tb\n".to_string()));
}

#[test]
fn skips_comments() {
    let tokens =
        llang::lexer::lex("// line\nx /* block\n comment */ y").expect("lex should succeed");
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[1].line, 3);
}

#[test]
fn tracks_spans_and_positions() {
    let tokens = llang::lexer::lex("let\n  value").expect("lex should succeed");
    assert_eq!(tokens[1].span, Span::new(6, 11));
    assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
}

#[test]
fn reports_unexpected_character() {
    let err = llang::lexer::lex("let x = 1 @").expect_err("lex should fail");
    assert!(err.message.contains("unexpected character '@'"));
    assert_eq!(err.column, 11);
}

#[test]
fn reports_unterminated_string() {
    let err = llang::lexer::lex("\"open").expect_err("lex should fail");
    assert_eq!(err.message, "unterminated string literal");
}
