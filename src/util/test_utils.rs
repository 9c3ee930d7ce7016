use crate::{
    parser,
    token::Located,
    type_checker,
    util::{
        self,
        fmt::{error::Message, tree, Show},
        intern::Interner,
    },
};

pub fn format_errors<E: Message>(i: &Interner, errors: &[Located<E>]) -> Vec<String> {
    let ctx = util::fmt::Context {
        ident_interner: i,
        path: "",
    };
    let mut formatted = Vec::with_capacity(errors.len());
    for e in errors {
        formatted.push(format!("{:#}", e.display(&ctx)));
        if let Some(note) = e.inner.note() {
            formatted.push(format!("{note}: defined here"));
        }
    }
    formatted
}

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    CheckerProgram(&'static str),
    CheckerExpr(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    let interner = &mut Interner::with_capacity(128);

    let (source, is_expr, check) = match test {
        Test::ParserProgram(source) => (source, false, false),
        Test::ParserExpr(source) => (source, true, false),
        Test::CheckerProgram(source) => (source, false, true),
        Test::CheckerExpr(source) => (source, true, true),
    };

    let parsed = if is_expr {
        parser::parse_expr(source, interner)
    } else {
        parser::parse_program(source, interner)
    };
    let mut program = match parsed {
        Ok(program) => program,
        Err(error) => return (String::new(), format_errors(interner, &[error])),
    };

    let mut errors = Vec::new();
    if check {
        let checked = if is_expr {
            type_checker::check_exprs(&mut program)
        } else {
            type_checker::check(&mut program).map(drop)
        };
        if let Err(error) = checked {
            errors = format_errors(interner, &[error]);
        }
    }

    (tree::print_program_string(interner, &program), errors)
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors)
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (formatted_actual_tree, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(checker, program), $source:expr) => {
        crate::util::test_utils::Test::CheckerProgram($source)
    };
    (@@get_test(checker, expr), $source:expr) => {
        crate::util::test_utils::Test::CheckerExpr($source)
    };
}
pub(crate) use tree_tests;
