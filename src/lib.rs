pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod source;
pub mod types;
pub mod verify;
