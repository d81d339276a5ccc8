//! Routes traps raised by the backend to the right handler.
//!
//! Handlers are plain functions of `(context, trap)` returning an [`Action`];
//! the run loop in [`crate::process`] owns the context and decides whether to
//! resume.

use log::{debug, error, warn};

use crate::{
    arch::ArchDescriptor,
    backend::{Access, Backend, BackendError, Trap, TrapKind},
    config::UnknownSyscallPolicy,
    error::{Error, FaultError, UnknownSyscallError},
    kernel::{Kernel, Outcome, SyscallCtx},
    process::ExecutionContext,
};

/// Bytes of code listed after an invalid memory access.
const FAULT_LISTING_LEN: u64 = 16;

/// Highest errno a negative syscall return can carry.
const MAX_ERRNO: i64 = 4095;

/// What the run loop should do once a trap has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Resume,
    /// Stop running; the program exited with this status.
    Halt(i32),
}

/// The trap classes every run installs, in installation order.
pub const HOOKS: [TrapKind; 3] = [
    TrapKind::InvalidMemory,
    TrapKind::Interrupt,
    TrapKind::SyscallInsn,
];

/// Ask the backend to deliver every trap class we handle. Must run before
/// execution starts.
pub fn install(backend: &mut dyn Backend) -> Result<(), BackendError> {
    for kind in HOOKS {
        backend.hook_add(kind)?;
    }
    Ok(())
}

pub fn dispatch<B: Backend, K: Kernel>(
    ctx: &mut ExecutionContext<B, K>,
    trap: &Trap,
) -> Result<Action, Error> {
    match *trap {
        Trap::InvalidMemory {
            access,
            addr,
            size,
            value,
        } => Err(invalid_memory(ctx, access, addr, size, value)),
        Trap::Interrupt(intno) => {
            if ctx.os.interrupt_is_syscall(ctx.arch, intno) {
                syscall(ctx)
            } else {
                let pc = ctx.backend.reg_read(ctx.arch.pc)?;
                warn!("ignoring interrupt {intno} at {pc:#x}");
                Ok(Action::Resume)
            }
        }
        Trap::Syscall => {
            if ctx.os.instruction_is_syscall(ctx.arch) {
                syscall(ctx)
            } else {
                let pc = ctx.backend.reg_read(ctx.arch.pc)?;
                warn!(
                    "ignoring syscall instruction at {pc:#x}: {} enters the kernel by interrupt",
                    ctx.arch.name
                );
                Ok(Action::Resume)
            }
        }
    }
}

fn invalid_memory<B: Backend, K: Kernel>(
    ctx: &mut ExecutionContext<B, K>,
    access: Access,
    addr: u64,
    size: usize,
    value: i64,
) -> Error {
    let pc = match ctx.backend.reg_read(ctx.arch.pc) {
        Ok(pc) => pc,
        Err(err) => return err.into(),
    };
    let fault = FaultError {
        access,
        addr,
        size,
        value,
        pc,
        symbol: ctx.exe.symbolicate(pc),
    };
    error!("{fault}");

    if ctx.config.disassemble_faults {
        match ctx.backend.disas(pc, FAULT_LISTING_LEN) {
            Ok(listing) => error!("code at {pc:#x}:\n{listing}"),
            Err(err) => debug!("no listing at {pc:#x}: {err}"),
        }
    }
    fault.into()
}

fn syscall<B: Backend, K: Kernel>(ctx: &mut ExecutionContext<B, K>) -> Result<Action, Error> {
    let arch = ctx.arch;
    let number = ctx.backend.reg_read(arch.syscall_num)?;

    let Some(sys) = ctx.os.syscalls.lookup(number) else {
        let err = UnknownSyscallError {
            number,
            arch: arch.name,
            os: ctx.os.name(),
        };
        return match ctx.config.unknown_syscall {
            UnknownSyscallPolicy::Fatal => Err(err.into()),
            UnknownSyscallPolicy::Enosys => {
                warn!("{err}, returning -ENOSYS");
                set_return(&mut ctx.backend, arch, -(libc::ENOSYS as i64))?;
                Ok(Action::Resume)
            }
        };
    };

    let mut sctx = SyscallCtx::new(&mut ctx.backend, arch);
    let outcome = ctx
        .kernel
        .call(sys, &mut sctx)
        .map_err(|source| Error::Syscall {
            syscall: sys,
            source,
        })?;

    match outcome {
        Outcome::Return(ret) => {
            debug!("{sys} = {ret:#x}");
            set_return(&mut ctx.backend, arch, ret)?;
            Ok(Action::Resume)
        }
        Outcome::Exit(status) => {
            debug!("{sys}({status})");
            Ok(Action::Halt(status))
        }
    }
}

/// Store a syscall result the way the ABI expects. Errnos are renumbered for
/// the target; architectures with an error flag get a positive errno plus the
/// flag set.
fn set_return(
    backend: &mut dyn Backend,
    arch: &ArchDescriptor,
    ret: i64,
) -> Result<(), BackendError> {
    let errno = (-MAX_ERRNO..0)
        .contains(&ret)
        .then(|| i64::from(arch.target_errno((-ret) as i32)));

    let Some(flag) = arch.error_flag else {
        let ret = errno.map_or(ret, |errno| -errno);
        return backend.reg_write(arch.syscall_ret, ret as u64);
    };
    if let Some(errno) = errno {
        backend.reg_write(arch.syscall_ret, errno as u64)?;
        backend.reg_write(flag, 1)
    } else {
        backend.reg_write(arch.syscall_ret, ret as u64)?;
        backend.reg_write(flag, 0)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;
    use crate::{
        arch::{M68K, MIPS, Reg, X86, X86_64},
        config::Config,
        loader::{Executable, Segment, Target},
        mapper,
        os::resolve,
        soft::SoftCpu,
        symbols::{Symbol, SymbolTable},
        syscall::Syscall,
    };

    /// Records every call and answers with a fixed outcome.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<Syscall>,
        fail: bool,
    }

    impl Kernel for Recorder {
        fn call(&mut self, syscall: Syscall, ctx: &mut SyscallCtx<'_>) -> anyhow::Result<Outcome> {
            self.calls.push(syscall);
            if self.fail {
                bail!("host refused");
            }
            match syscall {
                Syscall::Exit | Syscall::ExitGroup => {
                    let (status,): (i32,) = ctx.args()?;
                    Ok(Outcome::Exit(status))
                }
                Syscall::Read => Ok(Outcome::Return(-(libc::EBADF as i64))),
                _ => Ok(Outcome::Return(7)),
            }
        }
    }

    fn context(
        arch: &'static ArchDescriptor,
        machine: u16,
        config: Config,
    ) -> ExecutionContext<SoftCpu, Recorder> {
        let target = Target {
            machine,
            bits: arch.bits,
            endian: arch.endian,
            os_abi: 0,
        };
        let (arch, os) = resolve(&target).unwrap();
        let exe = Executable {
            entry: 0x1000,
            target,
            segments: vec![Segment {
                addr: 0x1000,
                data: vec![0x90; 0x20],
            }],
            data_segment: None,
            symbols: SymbolTable::new(vec![Symbol {
                name: "main".into(),
                value: 0x1000,
                size: 0x20,
            }]),
        };
        ExecutionContext::new(SoftCpu::new(arch), Recorder::default(), arch, os, exe, config)
    }

    #[test]
    fn installs_all_three_hooks() {
        let mut cpu = SoftCpu::new(&X86_64);
        install(&mut cpu).unwrap();
        assert_eq!(cpu.hooks().len(), 3);
        assert!(install(&mut cpu).is_err());
    }

    #[test]
    fn syscall_result_lands_in_the_return_register() {
        let mut ctx = context(&X86_64, goblin::elf::header::EM_X86_64, Config::default());
        ctx.backend.reg_write(Reg::Rax, 1).unwrap();

        assert_eq!(dispatch(&mut ctx, &Trap::Syscall).unwrap(), Action::Resume);
        assert_eq!(ctx.kernel.calls, vec![Syscall::Write]);
        assert_eq!(ctx.backend.reg_read(Reg::Rax).unwrap(), 7);
    }

    #[test]
    fn exit_halts_with_status() {
        let mut ctx = context(&X86, goblin::elf::header::EM_386, Config::default());
        ctx.backend.reg_write(Reg::Eax, 1).unwrap();
        ctx.backend.reg_write(Reg::Ebx, 3).unwrap();

        let action = dispatch(&mut ctx, &Trap::Interrupt(0x80)).unwrap();
        assert_eq!(action, Action::Halt(3));
    }

    #[test]
    fn unknown_syscall_never_reaches_the_kernel() {
        let mut ctx = context(&X86_64, goblin::elf::header::EM_X86_64, Config::default());
        ctx.backend.reg_write(Reg::Rax, 9999).unwrap();

        let err = dispatch(&mut ctx, &Trap::Syscall).unwrap_err();
        assert!(ctx.kernel.calls.is_empty());
        insta::assert_snapshot!(err.to_string(), @"linux/x86_64 has no syscall 9999");
    }

    #[test]
    fn unknown_syscall_can_return_enosys() {
        let config = Config {
            unknown_syscall: UnknownSyscallPolicy::Enosys,
            ..Config::default()
        };
        let mut ctx = context(&X86_64, goblin::elf::header::EM_X86_64, config);
        ctx.backend.reg_write(Reg::Rax, 9999).unwrap();

        assert_eq!(dispatch(&mut ctx, &Trap::Syscall).unwrap(), Action::Resume);
        assert!(ctx.kernel.calls.is_empty());
        assert_eq!(
            ctx.backend.reg_read(Reg::Rax).unwrap() as i64,
            -(libc::ENOSYS as i64)
        );
    }

    #[test]
    fn other_interrupts_are_ignored() {
        let mut ctx = context(&M68K, goblin::elf::header::EM_68K, Config::default());
        ctx.backend.reg_write(Reg::D0, 4).unwrap();

        assert_eq!(dispatch(&mut ctx, &Trap::Interrupt(33)).unwrap(), Action::Resume);
        assert!(ctx.kernel.calls.is_empty());

        dispatch(&mut ctx, &Trap::Interrupt(32)).unwrap();
        assert_eq!(ctx.kernel.calls, vec![Syscall::Write]);
    }

    #[test]
    fn mips_errors_set_a3_and_a_positive_errno() {
        let mut ctx = context(&MIPS, goblin::elf::header::EM_MIPS, Config::default());
        ctx.backend.reg_write(Reg::V0, 4003).unwrap();

        dispatch(&mut ctx, &Trap::Interrupt(17)).unwrap();
        assert_eq!(ctx.kernel.calls, vec![Syscall::Read]);
        assert_eq!(ctx.backend.reg_read(Reg::V0).unwrap(), libc::EBADF as u64);
        assert_eq!(ctx.backend.reg_read(Reg::A3).unwrap(), 1);

        ctx.backend.reg_write(Reg::V0, 4004).unwrap();
        dispatch(&mut ctx, &Trap::Interrupt(17)).unwrap();
        assert_eq!(ctx.backend.reg_read(Reg::V0).unwrap(), 7);
        assert_eq!(ctx.backend.reg_read(Reg::A3).unwrap(), 0);
    }

    #[test]
    fn mips_enosys_uses_the_mips_errno() {
        let config = Config {
            unknown_syscall: UnknownSyscallPolicy::Enosys,
            ..Config::default()
        };
        let mut ctx = context(&MIPS, goblin::elf::header::EM_MIPS, config);
        ctx.backend.reg_write(Reg::V0, 4999).unwrap();

        assert_eq!(dispatch(&mut ctx, &Trap::Interrupt(17)).unwrap(), Action::Resume);
        assert!(ctx.kernel.calls.is_empty());
        assert_eq!(ctx.backend.reg_read(Reg::V0).unwrap(), 89);
        assert_eq!(ctx.backend.reg_read(Reg::A3).unwrap(), 1);
    }

    #[test]
    fn syscall_instruction_is_ignored_where_the_gate_is_an_interrupt() {
        let mut ctx = context(&X86, goblin::elf::header::EM_386, Config::default());
        ctx.backend.reg_write(Reg::Eax, 1).unwrap();
        ctx.backend.reg_write(Reg::Ebx, 3).unwrap();

        assert_eq!(dispatch(&mut ctx, &Trap::Syscall).unwrap(), Action::Resume);
        assert!(ctx.kernel.calls.is_empty());
        assert_eq!(ctx.backend.reg_read(Reg::Eax).unwrap(), 1);
    }

    #[test]
    fn kernel_failures_name_the_syscall() {
        let mut ctx = context(&X86_64, goblin::elf::header::EM_X86_64, Config::default());
        ctx.kernel.fail = true;
        ctx.backend.reg_write(Reg::Rax, 1).unwrap();

        let err = dispatch(&mut ctx, &Trap::Syscall).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"syscall write failed: host refused");
    }

    #[test]
    fn invalid_memory_is_symbolicated_and_fatal() {
        let config = Config {
            disassemble_faults: false,
            ..Config::default()
        };
        let mut ctx = context(&X86_64, goblin::elf::header::EM_X86_64, config);
        ctx.backend.reg_write(Reg::Rip, 0x1004).unwrap();

        let trap = Trap::InvalidMemory {
            access: Access::Read,
            addr: 0x10,
            size: 8,
            value: 0,
        };
        let err = dispatch(&mut ctx, &trap).unwrap_err();
        assert!(matches!(err, Error::Fault(_)));
        insta::assert_snapshot!(err.to_string(), @"invalid read: @0x10, 0x8 = 0x0 (pc: 0x1004 main+0x4)");
    }

    #[test]
    fn fault_listing_leaves_the_error_unchanged() {
        let mut ctx = context(&X86_64, goblin::elf::header::EM_X86_64, Config::default());
        mapper::map_segments(&mut ctx.backend, &ctx.exe.segments).unwrap();
        ctx.backend.reg_write(Reg::Rip, 0x1004).unwrap();

        let trap = Trap::InvalidMemory {
            access: Access::Write,
            addr: 0x10,
            size: 4,
            value: 1,
        };
        let err = dispatch(&mut ctx, &trap).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"invalid write: @0x10, 0x4 = 0x1 (pc: 0x1004 main+0x4)");
    }
}
