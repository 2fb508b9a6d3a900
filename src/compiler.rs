//! End-to-end pipeline: source text in, C text out.

use tracing::{debug, info_span};

use crate::codegen::Generator;
use crate::config::Options;
use crate::error::CompileError;
use crate::ir::Module;
use crate::types::Checker;
use crate::{lexer, parser};

/// Runs every stage in order and stops at the first failure.
pub fn compile(source: &str, options: &Options) -> Result<String, CompileError> {
    let module = frontend(source)?;
    check(&module, options)?;

    let _span = info_span!("pcc.codegen", backend = options.backend.name()).entered();
    Ok(Generator::new(&module, options).generate()?)
}

/// Lexes and parses without type checking.
pub fn frontend(source: &str) -> Result<Module, CompileError> {
    let tokens = {
        let _span = info_span!("pcc.lex").entered();
        let tokens = lexer::tokenize(source)?;
        debug!(tokens = tokens.len(), "tokenized");
        tokens
    };

    let _span = info_span!("pcc.parse").entered();
    let module = parser::parse_tokens(tokens)?;
    debug!(
        classes = module.classes.len(),
        functions = module.functions.len(),
        statements = module.main.len(),
        "parsed module"
    );
    Ok(module)
}

pub fn check(module: &Module, options: &Options) -> Result<(), CompileError> {
    let _span = info_span!("pcc.check", backend = options.backend.name()).entered();
    Checker::new(module, options.backend).check_module()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use indoc::indoc;

    #[test]
    fn compiles_with_both_backends() {
        let source = indoc! {"
            def add(a, b):
                return a + b
            print(add(2, 3))
        "};
        for backend in Backend::ALL {
            let output = compile(source, &Options::with_backend(backend)).expect("compile");
            assert!(output.contains("pcc_fn_add"), "{backend}: {output}");
            assert!(output.contains("int main(void) {"));
        }
    }

    #[test]
    fn errors_are_tagged_with_their_stage() {
        let cases = [
            ("x = 1 $ 2\n", "lex"),
            ("print(y)\n", "parse"),
            ("a = \"x\"\nprint(a + 1)\n", "type"),
        ];
        for (source, stage) in cases {
            let err = compile(source, &Options::default()).expect_err(source);
            assert_eq!(err.stage(), stage, "{source}: {err}");
            assert_eq!(err.line(), if stage == "type" { 2 } else { 1 });
        }
    }

    #[test]
    fn error_display_includes_stage_prefix() {
        let err = compile("break\n", &Options::default()).expect_err("break outside loop");
        assert!(err.to_string().starts_with("parse error: "), "{err}");
    }

    #[test]
    fn literal_zero_division_is_rejected_before_codegen() {
        let err = compile("x = 4\nprint(x // 0)\n", &Options::default()).expect_err("zero");
        assert_eq!(err.stage(), "parse", "{err}");
    }

    #[test]
    fn source_name_reaches_runtime_raises() {
        let options = Options::default().source_name("demo.py");
        let output = compile("raise ValueError(\"bad\")\n", &options).expect("compile");
        assert!(output.contains("\"demo.py\""), "{output}");
    }
}
