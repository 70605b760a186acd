// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! `CE, CNE, CG, CGE, CL, CLE`, one function per scalar type (distilled
//! spec §4.3/§4.4). These are comparison-*branch* instructions, not
//! boolean-producing ones: each takes a single operand, an absolute branch
//! target. Pop `b`, pop `a`; if `a op b` holds, set the next PC to the
//! target, otherwise fall through to `pc + 1` (the `ExecContext` default).
//! Float comparisons use Rust's native `PartialOrd`, which already gives
//! the IEEE-754 NaN behavior the distilled spec requires (every ordered
//! comparison against `NaN` is false, including `CE`, so `CNE` against
//! `NaN` branches).

use super::ExecContext;
use crate::error::VmResult;
use crate::value::{self};

fn branch_if(ctx: &mut ExecContext, taken: bool) -> VmResult<()> {
    if taken {
        let target = ctx.operand_i32(0)?;
        ctx.next_pc = target;
    }
    Ok(())
}

macro_rules! compare_family {
    ($ce:ident, $cne:ident, $cg:ident, $cge:ident, $cl:ident, $cle:ident, $expect:ident) => {
        pub fn $ce(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            branch_if(ctx, a == b)
        }
        pub fn $cne(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            branch_if(ctx, a != b)
        }
        pub fn $cg(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            branch_if(ctx, a > b)
        }
        pub fn $cge(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            branch_if(ctx, a >= b)
        }
        pub fn $cl(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            branch_if(ctx, a < b)
        }
        pub fn $cle(ctx: &mut ExecContext) -> VmResult<()> {
            let b = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            let a = value::$expect(ctx.stack.pop(ctx.pc)?, ctx.pc)?;
            branch_if(ctx, a <= b)
        }
    };
}

compare_family!(ce_i8, cne_i8, cg_i8, cge_i8, cl_i8, cle_i8, expect_i8);
compare_family!(ce_i16, cne_i16, cg_i16, cge_i16, cl_i16, cle_i16, expect_i16);
compare_family!(ce_i32, cne_i32, cg_i32, cge_i32, cl_i32, cle_i32, expect_i32);
compare_family!(ce_i64, cne_i64, cg_i64, cge_i64, cl_i64, cle_i64, expect_i64);

/// Registers `CE, CNE, CG, CGE, CL, CLE` for every scalar type family into
/// the opcode dispatch table.
pub fn install(d: &mut crate::dispatch::Dispatcher) {
    use crate::opcode::{ce_opcode, cge_opcode, cl_opcode, cle_opcode, cne_opcode, cg_opcode, TypeFamily};

    macro_rules! install_family {
        ($family:expr, $ce:expr, $cne:expr, $cg:expr, $cge:expr, $cl:expr, $cle:expr) => {
            d.register(ce_opcode($family), $ce);
            d.register(cne_opcode($family), $cne);
            d.register(cg_opcode($family), $cg);
            d.register(cge_opcode($family), $cge);
            d.register(cl_opcode($family), $cl);
            d.register(cle_opcode($family), $cle);
        };
    }

    install_family!(TypeFamily::Byte8, ce_i8, cne_i8, cg_i8, cge_i8, cl_i8, cle_i8);
    install_family!(TypeFamily::Short16, ce_i16, cne_i16, cg_i16, cge_i16, cl_i16, cle_i16);
    install_family!(TypeFamily::Int32, ce_i32, cne_i32, cg_i32, cge_i32, cl_i32, cle_i32);
    install_family!(TypeFamily::Long64, ce_i64, cne_i64, cg_i64, cge_i64, cl_i64, cle_i64);
    install_family!(TypeFamily::Float32, ce_f32, cne_f32, cg_f32, cge_f32, cl_f32, cle_f32);
    install_family!(TypeFamily::Double64, ce_f64, cne_f64, cg_f64, cge_f64, cl_f64, cle_f64);
}
compare_family!(ce_f32, cne_f32, cg_f32, cge_f32, cl_f32, cle_f32, expect_f32);
compare_family!(ce_f64, cne_f64, cg_f64, cge_f64, cl_f64, cle_f64, expect_f64);
