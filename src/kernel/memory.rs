use anyhow::Result;
use log::debug;

use super::{HostKernel, SyscallCtx};
use crate::backend::align_up;

impl HostKernel {
    /// brk(addr): grow the heap above the loaded image. Like Linux, failure
    /// (or a query with 0) returns the current break unchanged.
    pub(super) fn sys_brk(&mut self, ctx: &mut SyscallCtx<'_>) -> Result<i64> {
        let (requested,): (u64,) = ctx.args()?;
        let Some(brk) = self.brk.as_mut() else {
            return Ok(0);
        };

        if requested < brk.base {
            return Ok(brk.current as i64);
        }

        let target = align_up(requested, ctx.page_size());
        if target > brk.mapped {
            if let Err(err) = ctx.map(brk.mapped, target - brk.mapped) {
                debug!("brk to {requested:#x} refused: {err}");
                return Ok(brk.current as i64);
            }
            brk.mapped = target;
        }

        // shrinking keeps the pages mapped
        brk.current = requested;
        Ok(requested as i64)
    }
}
