//! `hoc demo`: build two statements through the host API and run them.
//!
//! The first is a loop over a built-in function and uses nothing but names
//! an image can resolve on its own, so `--write` saves it for `hoc run`.
//! The second drives a native class through member calls.

use std::path::PathBuf;

use hoc_ir::{Code, CodeBuilder, ComponentFlags, Opcode, SymbolId, TemplateId};
use hoc_vm::{Interpreter, NativeClass};

use crate::image::{image_of, write_image, CliError};

#[derive(Clone, Debug, Default)]
pub struct DemoOptions {
    /// Save the loop statement as an image here.
    pub write: Option<PathBuf>,
}

pub fn run_demo(interp: &mut Interpreter, options: &DemoOptions) -> Result<(), CliError> {
    let table = square_roots(interp)?;
    if let Some(path) = &options.write {
        write_image(path, &image_of(interp, &table)?)?;
        tracing::info!(path = %path.display(), "wrote demo image");
    }
    interp.run(table)?;

    let counter = counter_statement(interp)?;
    interp.run(counter)?;
    Ok(())
}

fn constant(interp: &mut Interpreter, value: f64) -> Result<SymbolId, CliError> {
    let name = value.to_string();
    match interp.lookup(&name) {
        Some(sym) => Ok(sym),
        None => Ok(interp.install_constant(&name, value)?),
    }
}

/// `for i = 1, 5 print i, sqrt(i)`
fn square_roots(interp: &mut Interpreter) -> Result<Code, CliError> {
    let one = constant(interp, 1.0)?;
    let five = constant(interp, 5.0)?;
    let sqrt = interp
        .lookup("sqrt")
        .ok_or_else(|| CliError::Setup("sqrt is not installed".to_string()))?;
    let i = match interp.lookup("i") {
        Some(sym) => sym,
        None => interp.declare_on_the_fly("i")?,
    };

    let mut b = CodeBuilder::new();
    let (body, next) = (b.label(), b.label());
    b.op(Opcode::VarPush)
        .sym(i)
        .op(Opcode::ConstPush)
        .sym(one)
        .op(Opcode::ConstPush)
        .sym(five);
    b.op(Opcode::ShortFor).rel(body).rel(next);
    b.bind(body);
    b.op(Opcode::VarPush).sym(i).op(Opcode::Eval).op(Opcode::PrExpr);
    b.op(Opcode::VarPush)
        .sym(i)
        .op(Opcode::Eval)
        .op(Opcode::Bltin)
        .sym(sqrt)
        .op(Opcode::PrExpr)
        .op(Opcode::Newline)
        .stop();
    b.bind(next);
    b.stop();
    Ok(b.finish()?)
}

#[derive(Default)]
struct Counter {
    n: f64,
}

fn counter_class() -> NativeClass {
    NativeClass::builder("Counter", |_ctx| Ok(Counter::default()))
        .method("bump", |counter: &mut Counter, ctx| {
            counter.n += ctx.number(1)?;
            Ok(counter.n)
        })
        .property("n", |counter: &Counter| counter.n, |counter: &mut Counter, n| counter.n = n)
        .build()
}

fn member(interp: &Interpreter, tid: TemplateId, name: &str) -> Result<SymbolId, CliError> {
    interp
        .objects()
        .template(tid)
        .and_then(|template| interp.symbols().lookup_in(name, template.scope))
        .ok_or_else(|| CliError::Setup(format!("Counter has no member {name}")))
}

fn component(
    b: &mut CodeBuilder,
    member: SymbolId,
    narg: i32,
    flags: ComponentFlags,
) -> Result<(), CliError> {
    let bits = i32::try_from(flags.bits())
        .map_err(|_| CliError::Setup(format!("component flags {flags:?} do not fit an operand")))?;
    b.op(Opcode::ObjectComponent)
        .sym(member)
        .int(0)
        .int(narg)
        .cache()
        .int(bits);
    Ok(())
}

/// `objref c  c = new Counter()  c.bump(2)  c.bump(3)  print c, c.n`
fn counter_statement(interp: &mut Interpreter) -> Result<Code, CliError> {
    let tid = interp.register_native_class(counter_class())?;
    let class = interp
        .lookup("Counter")
        .ok_or_else(|| CliError::Setup("Counter is not registered".to_string()))?;
    let bump = member(interp, tid, "bump")?;
    let n = member(interp, tid, "n")?;
    let c = interp.declare_objref("c", &[])?;
    let steps = [constant(interp, 2.0)?, constant(interp, 3.0)?];

    let mut b = CodeBuilder::new();
    b.op(Opcode::ObjectVar)
        .sym(c)
        .op(Opcode::NewObj)
        .sym(class)
        .int(0)
        .op(Opcode::Pop);
    for step in steps {
        b.op(Opcode::ObjectVar).sym(c).op(Opcode::ConstPush).sym(step);
        component(&mut b, bump, 1, ComponentFlags::CALL)?;
        b.op(Opcode::Pop);
    }
    b.op(Opcode::ObjectVar).sym(c).op(Opcode::PrExpr);
    b.op(Opcode::ObjectVar).sym(c);
    component(&mut b, n, 0, ComponentFlags::empty())?;
    b.op(Opcode::ObjectEval)
        .op(Opcode::PrExpr)
        .op(Opcode::Newline)
        .stop();
    Ok(b.finish()?)
}
