//! Reading, writing and loading body images.

use std::path::{Path, PathBuf};

use hoc_ir::{Code, CodeError, EncodedBody};
use hoc_vm::{ExecError, Interpreter, SymbolId};
use thiserror::Error;

/// Anything that ends a command early.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad image: {0}")]
    Code(#[from] CodeError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{0}")]
    Setup(String),
}

pub fn read_image(path: &Path) -> Result<EncodedBody, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let image = EncodedBody::from_bytes(&bytes)?;
    tracing::debug!(
        path = %path.display(),
        words = image.words.len(),
        symbols = image.symbols.len(),
        "read image"
    );
    Ok(image)
}

pub fn write_image(path: &Path, image: &EncodedBody) -> Result<(), CliError> {
    let bytes = image.to_bytes()?;
    std::fs::write(path, bytes).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Image of `code`, naming its symbols from `interp`'s table.
pub fn image_of(interp: &Interpreter, code: &Code) -> Result<EncodedBody, CodeError> {
    EncodedBody::from_code(code, |sym| {
        interp
            .symbols()
            .get(sym)
            .map(|symbol| symbol.name.to_string())
    })
}

/// Decode `image` against `interp`, creating the symbols it names.
///
/// A name resolves to the visible symbol of that name if there is one.
/// Otherwise a numeric literal becomes a constant named by its text and any
/// other name becomes an on-the-fly variable.
pub fn load(interp: &mut Interpreter, image: &EncodedBody) -> Result<Code, CliError> {
    for name in &image.symbols {
        resolve(interp, name)?;
    }
    let code = image.to_code(|name| {
        interp
            .lookup(name)
            .ok_or_else(|| CodeError::Image(format!("unresolved symbol {name}")))
    })?;
    Ok(code)
}

fn resolve(interp: &mut Interpreter, name: &str) -> Result<SymbolId, ExecError> {
    if let Some(sym) = interp.lookup(name) {
        return Ok(sym);
    }
    let literal = name.starts_with(|c: char| c.is_ascii_digit() || c == '.');
    if let (true, Ok(value)) = (literal, name.parse::<f64>()) {
        return interp.install_constant(name, value);
    }
    tracing::debug!(name, "image symbol declared on the fly");
    interp.declare_on_the_fly(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use hoc_vm::{buffer_handler, CodeBuilder, ExecMode, Opcode, VmConfig};

    fn interpreter() -> (Interpreter, hoc_vm::SharedPrintHandler) {
        let out = buffer_handler();
        let interp = Interpreter::with_config(VmConfig::for_mode(ExecMode::Embedded))
            .with_print_handler(std::sync::Arc::clone(&out));
        (interp, out)
    }

    #[test]
    fn loading_creates_literals_and_variables() {
        let (mut writer, _) = interpreter();
        let seven = writer.install_constant("7", 7.0).unwrap();
        let x = writer.declare_var("x", &[]).unwrap();
        let pi = writer.lookup("PI").unwrap();
        // x = 7  print x + PI
        let mut b = CodeBuilder::new();
        b.op(Opcode::ConstPush)
            .sym(seven)
            .op(Opcode::VarPush)
            .sym(x)
            .op(Opcode::Assign)
            .int(0)
            .op(Opcode::Pop);
        b.op(Opcode::VarPush)
            .sym(x)
            .op(Opcode::Eval)
            .op(Opcode::ConstPush)
            .sym(pi)
            .op(Opcode::Add)
            .op(Opcode::PrExpr)
            .op(Opcode::Newline)
            .stop();
        let image = image_of(&writer, &b.finish().unwrap()).unwrap();
        assert_eq!(image.symbols, vec!["7", "x", "PI"]);

        let bytes = image.to_bytes().unwrap();
        let image = EncodedBody::from_bytes(&bytes).unwrap();
        let (mut reader, out) = interpreter();
        let code = load(&mut reader, &image).unwrap();
        reader.run(code).unwrap();

        let x = reader.lookup("x").unwrap();
        assert_eq!(reader.number_value(x), Some(7.0));
        assert_eq!(out.take(), "10.141593 \n");
    }

    #[test]
    fn images_from_another_table_are_rejected() {
        let mut image = EncodedBody {
            table_digest: "00".to_string(),
            symbols: Vec::new(),
            words: Vec::new(),
        };
        let (mut interp, _) = interpreter();
        let err = load(&mut interp, &image).unwrap_err();
        assert!(err.to_string().contains("opcode table mismatch"), "{err}");

        image.table_digest = hoc_ir::opcode_table_digest().to_string();
        image.words.push(hoc_ir::EncodedWord::Sym(0));
        assert!(matches!(load(&mut interp, &image), Err(CliError::Code(_))));
    }
}
