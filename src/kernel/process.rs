use anyhow::Result;
use log::info;

use super::{HostKernel, Outcome, SyscallCtx};

impl HostKernel {
    /// exit(status) and exit_group(status). The host process is left alone;
    /// the run loop halts and reports the status.
    pub(super) fn sys_exit(ctx: &mut SyscallCtx<'_>) -> Result<Outcome> {
        let (status,): (i32,) = ctx.args()?;
        info!("program exited with status {status}");
        Ok(Outcome::Exit(status))
    }

    pub(super) fn sys_getpid() -> i64 {
        unsafe { libc::getpid() as i64 }
    }

    pub(super) fn sys_gettid() -> i64 {
        unsafe { libc::syscall(libc::SYS_gettid) }
    }

    pub(super) fn sys_getuid() -> i64 {
        unsafe { libc::getuid() as i64 }
    }

    pub(super) fn sys_geteuid() -> i64 {
        unsafe { libc::geteuid() as i64 }
    }

    pub(super) fn sys_getgid() -> i64 {
        unsafe { libc::getgid() as i64 }
    }

    pub(super) fn sys_getegid() -> i64 {
        unsafe { libc::getegid() as i64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch::{ARM, Reg, X86},
        backend::Backend,
        kernel::Kernel,
        soft::SoftCpu,
        syscall::Syscall,
    };

    #[test]
    fn exit_group_reports_the_status() {
        let mut cpu = SoftCpu::new(&X86);
        cpu.reg_write(Reg::Ebx, 42).unwrap();
        let mut ctx = SyscallCtx::new(&mut cpu, &X86);
        let out = HostKernel::new().call(Syscall::ExitGroup, &mut ctx).unwrap();
        assert_eq!(out, Outcome::Exit(42));
    }

    #[test]
    fn negative_exit_status_survives_a_32_bit_register() {
        let mut cpu = SoftCpu::new(&ARM);
        cpu.reg_write(Reg::R0, (-1i64) as u64).unwrap();
        let mut ctx = SyscallCtx::new(&mut cpu, &ARM);
        let out = HostKernel::new().call(Syscall::Exit, &mut ctx).unwrap();
        assert_eq!(out, Outcome::Exit(-1));
    }

    #[test]
    fn identity_comes_from_the_host() {
        let mut cpu = SoftCpu::new(&X86);
        let mut ctx = SyscallCtx::new(&mut cpu, &X86);
        let mut kernel = HostKernel::new();

        assert_eq!(
            kernel.call(Syscall::Getpid, &mut ctx).unwrap(),
            Outcome::Return(std::process::id() as i64)
        );
        let uid = unsafe { libc::getuid() } as i64;
        assert_eq!(
            kernel.call(Syscall::Getuid32, &mut ctx).unwrap(),
            Outcome::Return(uid)
        );
    }
}
