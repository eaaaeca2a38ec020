use crate::codegen::{FragmentCompilerBuilder, Op};
use crate::{Error, Result};
use cranelift::codegen::control::ControlPlane;
use cranelift::codegen::ir::{types, AbiParam, InstBuilder, MemFlags, Signature, Value};
use cranelift::codegen::isa::OwnedTargetIsa;
use cranelift::codegen::Context;
use cranelift::frontend::{FunctionBuilder, FunctionBuilderContext};
use log::{debug, trace};
use target_lexicon::Triple;

pub struct FragmentCompiler {
    pub(super) isa: OwnedTargetIsa,
}

impl FragmentCompiler {
    pub fn builder() -> FragmentCompilerBuilder {
        FragmentCompilerBuilder::new()
    }

    pub fn triple(&self) -> &Triple {
        self.isa.triple()
    }

    /// **Compiles `ops` to raw machine code**
    ///
    /// The fragment takes the argument block's address as its only parameter
    /// and returns nothing. Values left on the stack are discarded.
    pub fn compile(&self, ops: &[Op]) -> Result<Vec<u8>> {
        let mut ctx = Context::new();
        ctx.func.signature = Signature::new(self.isa.default_call_conv());
        ctx.func
            .signature
            .params
            .push(AbiParam::new(self.isa.pointer_type()));

        let mut func_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);

        let main_block = builder.create_block();
        builder.switch_to_block(main_block);
        builder.append_block_params_for_function_params(main_block);
        let block_ptr = builder.block_params(main_block)[0];

        let mut stack = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            compile_op(&mut builder, &mut stack, block_ptr, index, *op)?;
        }
        builder.seal_block(main_block);

        builder.ins().return_(&[]);
        builder.finalize();
        trace!("fragment ir:\n{}", ctx.func.display());

        let compiled = ctx
            .compile(&*self.isa, &mut ControlPlane::default())
            .map_err(|e| Error::Codegen(e.inner.to_string()))?;
        let code = compiled.code_buffer().to_vec();
        debug!("compiled {} ops into {} bytes", ops.len(), code.len());

        Ok(code)
    }
}

fn compile_op(
    builder: &mut FunctionBuilder,
    stack: &mut Vec<Value>,
    block_ptr: Value,
    index: usize,
    op: Op,
) -> Result<()> {
    let flags = MemFlags::trusted();
    match op {
        Op::LoadF64(offset) => {
            trace!("load f64 [{offset}]");
            let val = builder.ins().load(types::F64, flags, block_ptr, offset);
            stack.push(val);
        }
        Op::LoadI64(offset) => {
            trace!("load i64 [{offset}]");
            let val = builder.ins().load(types::I64, flags, block_ptr, offset);
            stack.push(val);
        }
        Op::StoreF64(offset) => {
            let val = pop_typed(builder, stack, index, types::F64)?;
            trace!("store f64 {val:?} -> [{offset}]");
            builder.ins().store(flags, val, block_ptr, offset);
        }
        Op::StoreI64(offset) => {
            let val = pop_typed(builder, stack, index, types::I64)?;
            trace!("store i64 {val:?} -> [{offset}]");
            builder.ins().store(flags, val, block_ptr, offset);
        }
        Op::PushF64(value) => {
            let val = builder.ins().f64const(value);
            stack.push(val);
        }
        Op::PushI64(value) => {
            let val = builder.ins().iconst(types::I64, value);
            stack.push(val);
        }
        Op::Add => binary_op(builder, stack, index, |builder, a, b, float| {
            if float {
                builder.ins().fadd(a, b)
            } else {
                builder.ins().iadd(a, b)
            }
        })?,
        Op::Sub => binary_op(builder, stack, index, |builder, a, b, float| {
            if float {
                builder.ins().fsub(a, b)
            } else {
                builder.ins().isub(a, b)
            }
        })?,
        Op::Mul => binary_op(builder, stack, index, |builder, a, b, float| {
            if float {
                builder.ins().fmul(a, b)
            } else {
                builder.ins().imul(a, b)
            }
        })?,
        Op::Div => binary_op(builder, stack, index, |builder, a, b, float| {
            if float {
                builder.ins().fdiv(a, b)
            } else {
                builder.ins().sdiv(a, b)
            }
        })?,
        Op::Neg => {
            let a = pop_value(stack, index)?;
            let res = if builder.func.dfg.value_type(a) == types::F64 {
                builder.ins().fneg(a)
            } else {
                builder.ins().ineg(a)
            };
            stack.push(res);
        }
    }
    Ok(())
}

fn binary_op<F>(
    builder: &mut FunctionBuilder,
    stack: &mut Vec<Value>,
    index: usize,
    op: F,
) -> Result<()>
where
    F: Fn(&mut FunctionBuilder, Value, Value, bool) -> Value,
{
    let (b, a) = (pop_value(stack, index)?, pop_value(stack, index)?);
    let ty = builder.func.dfg.value_type(a);
    if builder.func.dfg.value_type(b) != ty {
        return Err(Error::TypeMismatch(index));
    }
    trace!("binary_op {a:?} {b:?}");
    let res = op(builder, a, b, ty == types::F64);
    stack.push(res);
    Ok(())
}

fn pop_typed(
    builder: &FunctionBuilder,
    stack: &mut Vec<Value>,
    index: usize,
    ty: types::Type,
) -> Result<Value> {
    let val = pop_value(stack, index)?;
    if builder.func.dfg.value_type(val) != ty {
        return Err(Error::TypeMismatch(index));
    }
    Ok(val)
}

fn pop_value(stack: &mut Vec<Value>, index: usize) -> Result<Value> {
    stack.pop().ok_or(Error::StackUnderflow(index))
}
