//! `print`, `prexpr`, `prstr`.

use crate::errors::{cannot_print, ExecResult};
use crate::format::format_number;
use crate::interpreter::Interpreter;

use super::Operand;

impl Interpreter {
    /// Bare expression statement at top level: tab, value, newline.
    pub(super) fn print_line(&mut self) -> ExecResult<()> {
        self.print.write("\t");
        self.print_expr()?;
        self.print.newline();
        Ok(())
    }

    /// One item of a `print` list, followed by a space.
    pub(super) fn print_expr(&mut self) -> ExecResult<()> {
        let text = match self.operand_at(0)? {
            Operand::Number => format_number(self.stack.pop_number()?),
            Operand::Str => {
                let text = self.stack.pop_str()?;
                self.read_str(&text)?.to_string()
            }
            Operand::Object => {
                let (id, owned) = self.pop_object_operand()?;
                let name = self.object_name(id);
                if let Some(owned) = owned {
                    self.release_owned(owned)?;
                }
                name
            }
            Operand::Pointer | Operand::Other => return Err(cannot_print()),
        };
        self.print.write(&text);
        self.print.write(" ");
        Ok(())
    }

    pub(super) fn print_str(&mut self) -> ExecResult<()> {
        let text = self.stack.pop_str()?;
        let text = self.read_str(&text)?;
        self.print.write(&text);
        Ok(())
    }
}
