use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use pretty_assertions::assert_eq;

fn glos() -> Command {
    Command::new(env!("CARGO_BIN_EXE_glos"))
}

/// Writes `src` to a fresh file in the temporary directory.
fn source(name: &str, src: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("glos-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, src).unwrap();
    path
}

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn run(path: &Path) -> Output {
    glos().arg("run").arg(path).output().unwrap()
}

fn stdout(output: &Output) -> &str {
    std::str::from_utf8(&output.stdout).unwrap()
}

fn stderr(output: &Output) -> &str {
    std::str::from_utf8(&output.stderr).unwrap()
}

#[test]
fn help_prints_usage() {
    let output = glos().arg("help").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("Usage:\n    glos COMMAND [...]\n"));
}

#[test]
fn invalid_usage_exits_with_one() {
    for args in [&[][..], &["frobnicate"][..], &["build"][..]] {
        let output = glos().args(args).output().unwrap();
        assert_eq!(output.status.code(), Some(1), "args: {args:?}");
        assert!(stderr(&output).contains("Commands:"));
        assert!(output.stdout.is_empty());
    }
}

#[test]
fn run_prints_sum() {
    let path = source("sum.glos", "fn main() { var x i64 = 1; print x + 2 }");
    let output = run(&path);
    assert_eq!(stdout(&output), "3\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn run_demos() {
    let cases = [
        ("fib.glos", "1\n1\n2\n3\n5\n8\n13\n21\n"),
        ("shadowing.glos", "1\n2\n1\n2\n3\n"),
        ("apply.glos", "7\n81\n-1\n"),
    ];
    for (name, expected) in cases {
        let output = run(&demo(name));
        assert_eq!(stdout(&output), expected, "demo: {name}");
        assert!(output.status.success(), "demo: {name}");
    }
}

#[test]
fn type_error_is_reported() {
    let path = source("bad_add.glos", "fn main() { print true + 1 }");
    let output = run(&path);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let expected = format!(
        "{}:1:19: ERROR: expected arithmetic type, got 'bool'\n",
        path.display()
    );
    assert_eq!(stderr(&output), expected);
}

#[test]
fn arity_error_is_reported() {
    let path = source("arity.glos", "fn f(a i64) { } fn main() { f() }");
    let output = run(&path);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).ends_with("ERROR: expected 1 argument, got 0\n"));
}

#[test]
fn redefinition_has_note() {
    let path = source("redefined.glos", "var x = 1\nvar x = 2\nfn main() {}");
    let output = run(&path);
    assert_eq!(output.status.code(), Some(1));
    let p = path.display();
    assert_eq!(
        stderr(&output),
        format!("{p}:2:5: ERROR: redefinition of identifier 'x'\n{p}:1:5: NOTE: defined here\n")
    );
}

#[test]
fn main_contract() {
    let cases = [
        ("var x = 1", "function 'main' is not defined"),
        ("var main = 1", "function 'main' must be a function literal"),
        ("fn main(a i64) {}", "function 'main' cannot take any arguments"),
        ("fn main() i64 { return 1 }", "function 'main' cannot return anything"),
    ];
    for (i, (src, message)) in cases.into_iter().enumerate() {
        let path = source(&format!("main{i}.glos"), src);
        let output = run(&path);
        assert_eq!(output.status.code(), Some(1), "source: {src}");
        assert!(stderr(&output).contains(message), "source: {src}");
    }
}

#[test]
fn missing_file() {
    let output = glos().arg("build").arg("no/such/file.glos").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("could not read file 'no/such/file.glos'"));
}

#[test]
fn build_strips_extension() {
    let path = source("built.glos", "fn main() { print 42 }");
    let output = glos().arg("build").arg(&path).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let exe = path.with_extension("");
    assert!(!path.with_extension("o").exists());
    let output = Command::new(&exe).output().unwrap();
    assert_eq!(stdout(&output), "42\n");
    fs::remove_file(exe).unwrap();
}

#[test]
fn run_accepts_trailing_arguments() {
    let path = source("args.glos", "fn main() { print 0 }");
    let output = glos()
        .arg("run")
        .arg(&path)
        .arg("--flag")
        .arg("value")
        .output()
        .unwrap();
    assert_eq!(stdout(&output), "0\n");
    assert_eq!(output.status.code(), Some(0));
}

#[cfg(unix)]
#[test]
fn run_reports_signal_as_status() {
    const SIGILL: i32 = 4;
    // Division by zero traps.
    let path = source("div_zero.glos", "fn main() { var z i64\n print 1 / z }");
    let output = run(&path);
    assert_eq!(output.status.code(), Some(128 + SIGILL));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty(), "{}", stderr(&output));
}

#[test]
fn build_is_repeatable() {
    let dir = env::temp_dir().join(format!("glos-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let outputs: Vec<Output> = ["apply_a", "apply_b"]
        .into_iter()
        .map(|name| {
            let exe = dir.join(name);
            let built = glos()
                .arg("build")
                .arg(demo("apply.glos"))
                .arg("-o")
                .arg(&exe)
                .output()
                .unwrap();
            assert!(built.status.success(), "{}", stderr(&built));
            let output = Command::new(&exe).output().unwrap();
            fs::remove_file(exe).unwrap();
            output
        })
        .collect();
    assert_eq!(stdout(&outputs[0]), "7\n81\n-1\n");
    assert_eq!(stdout(&outputs[0]), stdout(&outputs[1]));
    assert_eq!(outputs[0].status.code(), outputs[1].status.code());
}

#[test]
fn mixed_width_globals() {
    let src = "var flag = true\nvar big = 9000000000\nvar other bool\nvar small i64\n\
               fn main() {\n  small = big + 1\n  print flag\n  print other\n  print small\n}";
    let path = source("globals.glos", src);
    let output = run(&path);
    assert_eq!(stdout(&output), "1\n0\n9000000001\n");
    assert_eq!(output.status.code(), Some(0));
}
