//! Read-only commands: the opcode table, digests and image checks.

use std::path::Path;

use hoc_ir::{opcode_table_digest, validate, Opcode, SymbolId};
use hoc_vm::{ExecMode, Interpreter, VmConfig};

use crate::image::{read_image, CliError};

pub fn list_opcodes() {
    println!("{:>4}  {:<26} operands", "id", "name");
    for op in Opcode::ALL {
        let signature = if op.signature().is_empty() {
            "-"
        } else {
            op.signature()
        };
        println!("{:>4}  {:<26} {signature}", op.id(), op.name());
    }
}

/// Print the opcode table digest and the built-in table digest. Images and
/// checkpoints are only portable between builds that agree on both.
pub fn print_digests() {
    let interp = Interpreter::with_config(VmConfig::for_mode(ExecMode::Batch));
    println!("opcode table  {}", opcode_table_digest());
    println!("built-ins     {}", interp.builtin_digest());
}

/// Decode and validate an image without running it.
pub fn check_image(path: &Path) -> Result<(), CliError> {
    let image = read_image(path)?;
    let mut next = 0_u32;
    let code = image.to_code(|_| {
        let sym = SymbolId::new(next);
        next += 1;
        Ok(sym)
    })?;
    validate(&code, image.symbols.len())?;
    println!(
        "{}: ok, {} words, {} symbols",
        path.display(),
        code.len(),
        image.symbols.len()
    );
    for (i, name) in image.symbols.iter().enumerate() {
        println!("  {i:>3}  {name}");
    }
    Ok(())
}
