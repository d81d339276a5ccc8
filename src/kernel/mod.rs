//! The syscall layer: turns a resolved [`Syscall`] plus lazily fetched
//! arguments into an [`Outcome`].
//!
//! [`HostKernel`] services a small set of Linux syscalls against the host;
//! anything else it knows the name of is answered with `-ENOSYS`.

mod io;
mod memory;
mod process;
mod system;

use anyhow::{Result, bail};
use log::warn;

use crate::{
    arch::ArchDescriptor,
    backend::{Backend, MemError},
    syscall::Syscall,
};

/// What the program should see once a syscall has been serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Write this value to the return register and keep running.
    Return(i64),
    /// The program asked to terminate with this status.
    Exit(i32),
}

pub trait Kernel {
    fn call(&mut self, syscall: Syscall, ctx: &mut SyscallCtx<'_>) -> Result<Outcome>;

    /// Told once at boot where the program break starts (the end of the
    /// highest loaded region).
    fn set_break(&mut self, _addr: u64) {}
}

/// Register and memory access for one syscall invocation.
///
/// Arguments are only read when asked for, so a syscall taking one argument
/// never touches the stack slots of a six-argument one.
pub struct SyscallCtx<'a> {
    backend: &'a mut dyn Backend,
    arch: &'static ArchDescriptor,
}

impl<'a> SyscallCtx<'a> {
    pub fn new(backend: &'a mut dyn Backend, arch: &'static ArchDescriptor) -> Self {
        Self { backend, arch }
    }

    pub fn arch(&self) -> &'static ArchDescriptor {
        self.arch
    }

    /// Fetch argument `index` (zero based) from its register, or from the
    /// stack once the argument registers run out.
    pub fn arg(&self, index: usize) -> Result<u64> {
        let regs = self.arch.syscall_args;
        if let Some(&reg) = regs.get(index) {
            return Ok(self.backend.reg_read(reg)?);
        }
        let Some(offset) = self.arch.stack_args_offset else {
            bail!("{} has no syscall argument {index}", self.arch.name);
        };
        let sp = self.backend.reg_read(self.arch.sp)?;
        let slot = sp + offset + self.arch.word_size() * (index - regs.len()) as u64;
        self.read_word(slot)
    }

    /// Read the first N arguments as a typed tuple.
    pub fn args<T: FromArgs>(&self) -> Result<T> {
        T::from_args(self)
    }

    pub fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>, MemError> {
        self.backend.mem_read_vec(addr, len)
    }

    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) -> Result<(), MemError> {
        self.backend.mem_write(addr, data)
    }

    /// Read one pointer-sized word in target byte order.
    pub fn read_word(&self, addr: u64) -> Result<u64> {
        let bytes = self.read_bytes(addr, self.arch.word_size() as usize)?;
        self.arch
            .decode_word(&bytes)
            .ok_or_else(|| anyhow::anyhow!("short word read at {addr:#x}"))
    }

    pub fn page_size(&self) -> u64 {
        self.backend.page_size()
    }

    pub fn map(&mut self, addr: u64, size: u64) -> Result<(), MemError> {
        self.backend.mem_map(addr, size)
    }
}

/// Convert a single argument value into a syscall argument type.
pub trait FromArg: Sized {
    fn from_arg(v: u64) -> Self;
}

impl FromArg for u64 {
    fn from_arg(v: u64) -> Self {
        v
    }
}

impl FromArg for u32 {
    fn from_arg(v: u64) -> Self {
        v as u32
    }
}

impl FromArg for i32 {
    fn from_arg(v: u64) -> Self {
        v as i32
    }
}

impl FromArg for usize {
    fn from_arg(v: u64) -> Self {
        v as usize
    }
}

/// Tuples of arguments, fetched in order starting at argument 0.
pub trait FromArgs: Sized {
    fn from_args(ctx: &SyscallCtx<'_>) -> Result<Self>;
}

macro_rules! impl_from_args {
    ($( $($ty:ident => $idx:tt),+ );+ $(;)?) => {
        $(
            impl<$($ty: FromArg),+> FromArgs for ($($ty,)+) {
                fn from_args(ctx: &SyscallCtx<'_>) -> Result<Self> {
                    Ok(( $($ty::from_arg(ctx.arg($idx)?),)+ ))
                }
            }
        )+
    };
}

impl_from_args! {
    A => 0;
    A => 0, B => 1;
    A => 0, B => 1, C => 2;
    A => 0, B => 1, C => 2, D => 3;
    A => 0, B => 1, C => 2, D => 3, E => 4;
    A => 0, B => 1, C => 2, D => 3, E => 4, F => 5;
}

/// Services syscalls by forwarding them to the host.
#[derive(Debug, Default)]
pub struct HostKernel {
    brk: Option<Break>,
}

#[derive(Debug, Clone, Copy)]
struct Break {
    base: u64,
    current: u64,
    /// End of the pages actually mapped for the heap.
    mapped: u64,
}

impl HostKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a libc return value to a kernel-style return (negative errno).
    fn libc_to_kernel(result: i64) -> i64 {
        if result == -1 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(1);
            -(errno as i64)
        } else {
            result
        }
    }
}

impl Kernel for HostKernel {
    fn call(&mut self, syscall: Syscall, ctx: &mut SyscallCtx<'_>) -> Result<Outcome> {
        use Syscall::*;

        let ret = match syscall {
            Exit | ExitGroup => return Self::sys_exit(ctx),
            Read => Self::sys_read(ctx)?,
            Write => Self::sys_write(ctx)?,
            Writev => Self::sys_writev(ctx)?,
            Getpid => Self::sys_getpid(),
            Gettid => Self::sys_gettid(),
            Getuid | Getuid32 => Self::sys_getuid(),
            Geteuid | Geteuid32 => Self::sys_geteuid(),
            Getgid | Getgid32 => Self::sys_getgid(),
            Getegid | Getegid32 => Self::sys_getegid(),
            Brk => self.sys_brk(ctx)?,
            Uname => Self::sys_uname(ctx)?,
            other => {
                warn!("{other} is not implemented, returning -ENOSYS");
                -(libc::ENOSYS as i64)
            }
        };
        Ok(Outcome::Return(ret))
    }

    fn set_break(&mut self, addr: u64) {
        self.brk = Some(Break {
            base: addr,
            current: addr,
            mapped: addr,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch::{MIPS, Reg, X86_64},
        soft::SoftCpu,
    };

    #[test]
    fn typed_arguments_come_from_registers_in_order() {
        let mut cpu = SoftCpu::new(&X86_64);
        cpu.reg_write(Reg::Rdi, 3).unwrap();
        cpu.reg_write(Reg::Rsi, 0x1000).unwrap();
        cpu.reg_write(Reg::Rdx, u64::MAX).unwrap();
        let ctx = SyscallCtx::new(&mut cpu, &X86_64);

        let (fd, buf, count): (i32, u64, i32) = ctx.args().unwrap();
        assert_eq!((fd, buf, count), (3, 0x1000, -1));
        assert!(ctx.arg(6).is_err());
    }

    #[test]
    fn mips_reads_extra_arguments_from_the_stack() {
        let mut cpu = SoftCpu::new(&MIPS);
        cpu.mem_map(0x7000, 0x1000).unwrap();
        cpu.reg_write(Reg::Sp, 0x7000).unwrap();
        cpu.reg_write(Reg::A3, 4).unwrap();
        cpu.mem_write(0x7010, &[0, 0, 0, 5, 0, 0, 0, 6]).unwrap();
        let ctx = SyscallCtx::new(&mut cpu, &MIPS);

        assert_eq!(ctx.arg(3).unwrap(), 4);
        assert_eq!(ctx.arg(4).unwrap(), 5);
        assert_eq!(ctx.arg(5).unwrap(), 6);
        assert!(ctx.arg(2000).is_err());
    }

    #[test]
    fn unimplemented_syscalls_return_enosys() {
        let mut cpu = SoftCpu::new(&X86_64);
        let mut ctx = SyscallCtx::new(&mut cpu, &X86_64);
        let mut kernel = HostKernel::new();
        assert_eq!(
            kernel.call(Syscall::Openat, &mut ctx).unwrap(),
            Outcome::Return(-(libc::ENOSYS as i64))
        );
    }
}
