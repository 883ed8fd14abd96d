//! Arithmetic, comparison and logical opcodes.
//!
//! Ordering comparisons treat values within `epsilon` of each other as
//! equal. `==` and `!=` also compare strings and object references,
//! choosing by the tag of the left operand.

use crate::errors::{
    cannot_compare, compound_divide_by_zero, division_by_zero, math_domain, math_range,
    modulo_non_positive, ExecResult,
};
use crate::interpreter::Interpreter;

use super::Operand;

/// Numeric binary operators; both operands are popped, right one first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Cyclic,
    Power,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
}

impl BinaryOp {
    pub(crate) fn apply(self, d1: f64, d2: f64, epsilon: f64) -> ExecResult<f64> {
        let value = match self {
            BinaryOp::Add => d1 + d2,
            BinaryOp::Sub => d1 - d2,
            BinaryOp::Mul => d1 * d2,
            BinaryOp::Div => {
                if d2 == 0.0 {
                    return Err(division_by_zero());
                }
                d1 / d2
            }
            BinaryOp::Cyclic => cyclic(d1, d2)?,
            BinaryOp::Power => power(d1, d2)?,
            BinaryOp::Gt => truth(d1 > d2 + epsilon),
            BinaryOp::Lt => truth(d1 < d2 - epsilon),
            BinaryOp::Ge => truth(d1 >= d2 - epsilon),
            BinaryOp::Le => truth(d1 <= d2 + epsilon),
            BinaryOp::And => truth(d1 != 0.0 && d2 != 0.0),
            BinaryOp::Or => truth(d1 != 0.0 || d2 != 0.0),
        };
        Ok(value)
    }
}

#[inline]
fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// `d1 % d2` folded into `[0, d2)`.
fn cyclic(d1: f64, d2: f64) -> ExecResult<f64> {
    if d2 <= 0.0 {
        return Err(modulo_non_positive());
    }
    let r = d1 - (d1 / d2).floor() * d2;
    Ok(if r >= d2 {
        r - d2
    } else if r < 0.0 {
        r + d2
    } else {
        r
    })
}

fn power(x: f64, y: f64) -> ExecResult<f64> {
    let value = x.powf(y);
    if value.is_nan() && !x.is_nan() && !y.is_nan() {
        return Err(math_domain("exponentiation"));
    }
    if value.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(math_range("exponentiation"));
    }
    Ok(value)
}

/// Apply a compound assignment operator (`+`, `-`, `*`, `/` as character
/// codes); any other code assigns `src` unchanged.
pub(crate) fn op_assign(op: i32, dest: f64, src: f64) -> ExecResult<f64> {
    let value = match u8::try_from(op).map(char::from) {
        Ok('+') => dest + src,
        Ok('-') => dest - src,
        Ok('*') => dest * src,
        Ok('/') => {
            if src == 0.0 {
                return Err(compound_divide_by_zero());
            }
            dest / src
        }
        _ => src,
    };
    Ok(value)
}

impl Interpreter {
    pub(super) fn binary(&mut self, op: BinaryOp) -> ExecResult<()> {
        let d2 = self.stack.pop_number()?;
        let d1 = self.stack.pop_number()?;
        let value = op.apply(d1, d2, self.config.epsilon)?;
        self.stack.push_number(value)
    }

    pub(super) fn negate(&mut self) -> ExecResult<()> {
        let d = self.stack.pop_number()?;
        self.stack.push_number(-d)
    }

    pub(super) fn not(&mut self) -> ExecResult<()> {
        let d = self.stack.pop_number()?;
        self.stack.push_number(truth(d == 0.0))
    }

    /// `==` (or `!=` when `negate`), dispatched on the left operand's tag.
    pub(super) fn equality(&mut self, negate: bool) -> ExecResult<()> {
        let equal = match self.operand_at(1)? {
            Operand::Number => {
                let d2 = self.stack.pop_number()?;
                let d1 = self.stack.pop_number()?;
                (d1 - d2).abs() <= self.config.epsilon
            }
            Operand::Str => {
                let s2 = self.stack.pop_str()?;
                let s1 = self.stack.pop_str()?;
                self.read_str(&s1)? == self.read_str(&s2)?
            }
            Operand::Object => {
                let (b, owned_b) = self.pop_object_operand()?;
                let left = self.pop_object_operand();
                let released = match owned_b {
                    Some(owned) => self.release_owned(owned),
                    None => Ok(()),
                };
                let (a, owned_a) = left?;
                if let Some(owned) = owned_a {
                    self.release_owned(owned)?;
                }
                released?;
                a == b
            }
            Operand::Pointer | Operand::Other => return Err(cannot_compare()),
        };
        self.stack.push_number(truth(equal != negate))
    }
}
