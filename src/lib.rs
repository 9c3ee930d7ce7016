/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The type checker resolves every identifier of a parsed AST and annotates
/// its nodes with their types, in place.
pub mod type_checker;

/// The code generator lowers a checked AST into a native object file.
pub mod codegen;

/// The driver runs the pipeline over a source file and links or runs the
/// result.
pub mod driver;

pub mod ast;
pub mod scope;
pub mod token;
pub mod types;

pub mod util {
    pub mod fmt;
    pub mod intern;
    #[cfg(test)]
    pub(crate) mod test_utils;
}
