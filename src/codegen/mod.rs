use std::fmt;

use cranelift_codegen::settings::{self, Configurable};
use cranelift_module::ModuleError;
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::{ast::Program, type_checker::Checked, util::intern::Interner};

mod lower;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Copy, Clone, Debug, Default)]
pub struct Options {
    /// Optimize for speed instead of compile time.
    pub release: bool,
}

impl Options {
    fn opt_level(self) -> &'static str {
        if self.release {
            "speed"
        } else {
            "none"
        }
    }
}

/// A relocatable object file for the host, ready to be linked.
#[derive(Debug)]
pub struct Artifact {
    pub object: Vec<u8>,
    /// One entry per function body in the object, in definition order.
    pub functions: Vec<FunctionDebug>,
}

/// Where a generated function comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDebug {
    pub symbol: String,
    pub file: String,
    /// 1-based.
    pub line: u32,
}

#[derive(Debug)]
pub enum Error {
    Isa(String),
    Module(Box<ModuleError>),
    Emit(String),
}

impl From<ModuleError> for Error {
    fn from(error: ModuleError) -> Self {
        Error::Module(Box::new(error))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Isa(error) => write!(f, "unsupported host: {error}"),
            Error::Module(error) => write!(f, "code generation failed: {error}"),
            Error::Emit(error) => write!(f, "could not emit object: {error}"),
        }
    }
}

impl std::error::Error for Error {}

/// Lowers a checked program into an object file for the host machine. The
/// object defines the C `main` symbol, which runs the global initializers and
/// then the program's `main` function.
pub fn generate(
    program: &Program,
    checked: &Checked,
    idents: &Interner,
    path: &str,
    options: Options,
) -> Result<Artifact> {
    let mut flags = settings::builder();
    flags
        .set("is_pic", "true")
        .map_err(|e| Error::Isa(e.to_string()))?;
    flags
        .set("opt_level", options.opt_level())
        .map_err(|e| Error::Isa(e.to_string()))?;
    let isa = cranelift_native::builder()
        .map_err(|e| Error::Isa(e.to_owned()))?
        .finish(settings::Flags::new(flags))
        .map_err(|e| Error::Isa(e.to_string()))?;
    tracing::debug!(triple = %isa.triple(), opt_level = options.opt_level(), "target");

    let builder = ObjectBuilder::new(isa, "glos", cranelift_module::default_libcall_names())?;
    let mut lowerer = lower::Lowerer::new(ObjectModule::new(builder), &program.ast, idents, path)?;
    lowerer.lower_program(program.nodes, checked)?;

    let (module, functions) = lowerer.finish();
    let object = module
        .finish()
        .emit()
        .map_err(|e| Error::Emit(e.to_string()))?;
    tracing::debug!(bytes = object.len(), functions = functions.len(), "emitted object");
    Ok(Artifact { object, functions })
}
