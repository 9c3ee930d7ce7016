use std::{
    env,
    ffi::{OsStr, OsString},
    fs, io,
    path::{Path, PathBuf},
    process::{self, Command, ExitStatus},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    codegen::{self, Artifact},
    parser,
    token::{Located, Pos},
    type_checker,
    util::{fmt::error::Message, intern::Interner},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        pub const DEFAULT_LINKER: &str = "gcc";
    } else {
        pub const DEFAULT_LINKER: &str = "cc";
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    pub input: PathBuf,
    /// Defaults to [`default_output`].
    pub output: Option<PathBuf>,
    pub release: bool,
    /// The C compiler driver used to link the object file.
    pub linker: String,
}

impl Options {
    /// Options for `input`, linking with `$CC` if set.
    pub fn new(input: impl Into<PathBuf>) -> Options {
        let linker = env::var("CC")
            .ok()
            .filter(|cc| !cc.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LINKER.to_owned());
        Options {
            input: input.into(),
            output: None,
            release: false,
            linker,
        }
    }

    pub fn output(&self) -> PathBuf {
        match &self.output {
            Some(output) => output.clone(),
            None => default_output(&self.input),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Syntax(Located<parser::Error>),
    Semantic(Located<type_checker::Error>),
    Codegen(codegen::Error),
    Read { path: String, source: io::Error },
    Write { path: String, source: io::Error },
    Spawn { program: String, source: io::Error },
    Linker { program: String, code: i32 },
}

impl Error {
    /// The source position of diagnostics.
    pub fn pos(&self) -> Option<Pos> {
        match self {
            Error::Syntax(error) => Some(error.pos),
            Error::Semantic(error) => Some(error.pos),
            _ => None,
        }
    }

    /// The position of the previous definition, for redefinitions.
    pub fn note(&self) -> Option<Pos> {
        match self {
            Error::Syntax(error) => error.inner.note(),
            Error::Semantic(error) => error.inner.note(),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Linker { code, .. } => *code,
            _ => 1,
        }
    }
}

impl From<Located<parser::Error>> for Error {
    fn from(error: Located<parser::Error>) -> Self {
        Error::Syntax(error)
    }
}

impl From<Located<type_checker::Error>> for Error {
    fn from(error: Located<type_checker::Error>) -> Self {
        Error::Semantic(error)
    }
}

impl From<codegen::Error> for Error {
    fn from(error: codegen::Error) -> Self {
        Error::Codegen(error)
    }
}

/// Runs the whole pipeline over `src`, stopping at the first error.
pub fn compile(
    path: &str,
    src: &str,
    interner: &mut Interner,
    options: codegen::Options,
) -> Result<Artifact> {
    let mut program = parser::parse_program(src, interner)?;
    tracing::debug!(nodes = program.ast.len(), "parsed");

    let checked = type_checker::check(&mut program)?;
    tracing::debug!(globals = checked.globals.len(), "checked");

    let artifact = codegen::generate(&program, &checked, interner, path, options)?;
    for function in &artifact.functions {
        tracing::trace!(symbol = %function.symbol, file = %function.file, line = function.line);
    }
    Ok(artifact)
}

/// Compiles the input file into an executable, returning its path.
pub fn build(options: &Options, interner: &mut Interner) -> Result<PathBuf> {
    let path = options.input.display().to_string();
    let src = fs::read_to_string(&options.input).map_err(|source| Error::Read {
        path: path.clone(),
        source,
    })?;
    let codegen_options = codegen::Options {
        release: options.release,
    };
    let artifact = compile(&path, &src, interner, codegen_options)?;

    let output = options.output();
    let object = object_path(&output);
    fs::write(&object, &artifact.object).map_err(|source| Error::Write {
        path: object.display().to_string(),
        source,
    })?;
    let linked = link(&options.linker, &object, &output);
    if let Err(error) = fs::remove_file(&object) {
        tracing::warn!(object = %object.display(), %error, "could not remove object file");
    }
    linked?;

    tracing::info!(output = %output.display(), "built");
    Ok(output)
}

/// Builds the input into a temporary executable and runs it with `args`,
/// returning its exit status.
pub fn run(options: &Options, args: &[OsString], interner: &mut Interner) -> Result<i32> {
    let dir = run_dir(&env::temp_dir())?;
    let exe = dir.join("main");
    let options = Options {
        output: Some(exe.clone()),
        ..options.clone()
    };
    let status = build(&options, interner).map(|_| {
        tracing::debug!(exe = %exe.display(), ?args, "running");
        Command::new(&exe).args(args).status()
    });
    if let Err(error) = fs::remove_dir_all(&dir) {
        tracing::warn!(dir = %dir.display(), %error, "could not remove run directory");
    }
    let status = status?;
    let status = status.map_err(|source| Error::Spawn {
        program: exe.display().to_string(),
        source,
    })?;
    tracing::debug!(%status, "program exited");
    Ok(exit_code(status))
}

/// Creates a fresh directory under `base`, private to the current user where
/// the platform allows it. Never reuses an existing entry.
fn run_dir(base: &Path) -> Result<PathBuf> {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.subsec_nanos());
    let mut last = io::Error::from(io::ErrorKind::AlreadyExists);
    for attempt in 0..16u32 {
        let dir = base.join(format!(
            "glos_run_{}_{:08x}",
            process::id(),
            seed.wrapping_add(attempt.wrapping_mul(0x9e37_79b9))
        ));
        match private_dir_builder().create(&dir) {
            Ok(()) => return Ok(dir),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => last = error,
            Err(source) => {
                return Err(Error::Write {
                    path: dir.display().to_string(),
                    source,
                })
            }
        }
    }
    Err(Error::Write {
        path: base.display().to_string(),
        source: last,
    })
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn private_dir_builder() -> fs::DirBuilder {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700);
            builder
        }
    } else {
        fn private_dir_builder() -> fs::DirBuilder {
            fs::DirBuilder::new()
        }
    }
}

/// The input path without its `.glos` extension, or with `.out` appended if
/// it has none.
pub fn default_output(input: &Path) -> PathBuf {
    if input.extension() == Some(OsStr::new("glos")) {
        input.with_extension("")
    } else {
        let mut output = input.as_os_str().to_owned();
        output.push(".out");
        PathBuf::from(output)
    }
}

fn object_path(output: &Path) -> PathBuf {
    let mut object = output.as_os_str().to_owned();
    object.push(".o");
    PathBuf::from(object)
}

fn link(linker: &str, object: &Path, output: &Path) -> Result<()> {
    tracing::debug!(linker, object = %object.display(), output = %output.display(), "linking");
    let status = Command::new(linker)
        .arg(object)
        .arg("-o")
        .arg(output)
        .status()
        .map_err(|source| Error::Spawn {
            program: linker.to_owned(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Linker {
            program: linker.to_owned(),
            code: exit_code(status),
        })
    }
}

/// The child's exit code, or 128 plus the signal that killed it.
fn exit_code(status: ExitStatus) -> i32 {
    status.code().or_else(|| signal_code(status)).unwrap_or(1)
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn signal_code(status: ExitStatus) -> Option<i32> {
            use std::os::unix::process::ExitStatusExt;
            status.signal().map(|signal| 128 + signal)
        }
    } else {
        fn signal_code(_: ExitStatus) -> Option<i32> {
            None
        }
    }
}
