//! Initial process stack: `argc`, `argv` and an empty `envp`.
//!
//! Layout from the final SP upward (one word each, target width and byte
//! order):
//!
//! ```text
//!   argc                    <-- SP
//!   argv[0] .. argv[n-1]
//!   NULL (argv terminator)
//!   NULL (envp terminator)
//! ```
//!
//! The argument strings live in their own mapping, not on the stack.

use log::{debug, info};

use crate::{
    arch::ArchDescriptor,
    backend::{Backend, MemError},
    error::StackError,
};

/// Where the stack ended up once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLayout {
    pub base: u64,
    pub size: u64,
    /// SP after every push.
    pub sp: u64,
    /// Address of the packed argument strings, if any were pushed.
    pub strings: Option<u64>,
}

impl StackLayout {
    /// One past the highest stack address.
    pub fn top(&self) -> u64 {
        self.base + self.size
    }
}

/// Pushes words onto the emulated stack through a [`Backend`].
pub struct StackBuilder<'a> {
    backend: &'a mut dyn Backend,
    arch: &'static ArchDescriptor,
}

impl<'a> StackBuilder<'a> {
    pub fn new(backend: &'a mut dyn Backend, arch: &'static ArchDescriptor) -> Self {
        Self { backend, arch }
    }

    /// Allocate `size` bytes at `preferred` (or wherever the backend has room)
    /// and point SP at the top of it. Returns the base address.
    pub fn allocate(&mut self, preferred: u64, size: u64) -> Result<u64, StackError> {
        let base = self
            .backend
            .mmap(preferred, size)
            .map_err(|source| StackError::Alloc {
                what: "stack",
                size,
                source,
            })?;
        self.backend
            .reg_write(self.arch.sp, base + size)
            .map_err(StackError::Register)?;
        debug!("stack at {:#x}..{:#x}", base, base + size);
        Ok(base)
    }

    pub fn sp(&self) -> Result<u64, StackError> {
        self.backend
            .reg_read(self.arch.sp)
            .map_err(StackError::Register)
    }

    /// Push one word. SP only moves once the word is in memory, so a failed
    /// push leaves the register untouched.
    pub fn push(&mut self, value: u64) -> Result<u64, StackError> {
        let sp = self.sp()?;
        let new_sp = sp
            .checked_sub(self.arch.word_size())
            .ok_or(StackError::Write {
                addr: sp,
                source: MemError::AddressOverflow {
                    addr: sp,
                    size: self.arch.word_size(),
                },
            })?;
        self.backend
            .mem_write(new_sp, &self.arch.encode_word(value))
            .map_err(|source| StackError::Write {
                addr: new_sp,
                source,
            })?;
        self.backend
            .reg_write(self.arch.sp, new_sp)
            .map_err(StackError::Register)?;
        Ok(new_sp)
    }

    /// Copy `strings` into a fresh mapping and push the argv pointer block
    /// (NULL terminator, then pointers last to first). Returns the address of
    /// the string buffer, or `None` when there is nothing to copy.
    pub fn push_strings(&mut self, strings: &[String]) -> Result<Option<u64>, StackError> {
        if strings.is_empty() {
            self.push(0)?;
            return Ok(None);
        }

        let mut buf = Vec::with_capacity(strings.iter().map(|s| s.len() + 1).sum());
        let mut offsets = Vec::with_capacity(strings.len());
        for s in strings {
            offsets.push(buf.len() as u64);
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }

        let size = buf.len() as u64;
        let addr = self
            .backend
            .mmap(0, size)
            .map_err(|source| StackError::Alloc {
                what: "argument strings",
                size,
                source,
            })?;
        self.backend
            .mem_write(addr, &buf)
            .map_err(|source| StackError::Write { addr, source })?;

        self.push(0)?;
        for offset in offsets.iter().rev() {
            self.push(addr + offset)?;
        }
        Ok(Some(addr))
    }
}

/// Build the whole initial stack for a program started with `args`.
pub fn build(
    backend: &mut dyn Backend,
    arch: &'static ArchDescriptor,
    stack_base: u64,
    stack_size: u64,
    args: &[String],
) -> Result<StackLayout, StackError> {
    let mut builder = StackBuilder::new(backend, arch);
    let base = builder.allocate(stack_base, stack_size)?;

    builder.push(0)?; // envp
    let strings = builder.push_strings(args)?;
    let sp = builder.push(args.len() as u64)?;

    info!("initial stack at {sp:#x} with {} arguments", args.len());
    Ok(StackLayout {
        base,
        size: stack_size,
        sp,
        strings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch::{M68K, Reg, X86_64},
        config::{STACK_BASE, STACK_SIZE},
        soft::SoftCpu,
    };

    fn words(cpu: &SoftCpu, arch: &ArchDescriptor, at: u64, count: usize) -> Vec<u64> {
        let bytes = cpu
            .mem_read_vec(at, count * arch.word_size() as usize)
            .unwrap();
        bytes
            .chunks(arch.word_size() as usize)
            .map(|w| arch.decode_word(w).unwrap())
            .collect()
    }

    fn c_string(cpu: &SoftCpu, addr: u64) -> String {
        let mut out = Vec::new();
        for i in 0.. {
            let b = cpu.mem_read_vec(addr + i, 1).unwrap()[0];
            if b == 0 {
                break;
            }
            out.push(b);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn argc_argv_and_terminators() {
        let mut cpu = SoftCpu::new(&X86_64);
        let args = vec!["a".to_string(), "bb".to_string()];
        let layout = build(&mut cpu, &X86_64, STACK_BASE, STACK_SIZE, &args).unwrap();

        assert_eq!(layout.base, STACK_BASE);
        assert_eq!(layout.sp, STACK_BASE + STACK_SIZE - 5 * 8);
        assert_eq!(cpu.reg_read(Reg::Rsp).unwrap(), layout.sp);

        let stack = words(&cpu, &X86_64, layout.sp, 5);
        assert_eq!(stack[0], 2);
        assert_eq!(c_string(&cpu, stack[1]), "a");
        assert_eq!(c_string(&cpu, stack[2]), "bb");
        assert_eq!(stack[2], stack[1] + 2);
        assert_eq!(&stack[3..], &[0, 0]);
        assert_eq!(layout.strings, Some(stack[1]));
    }

    #[test]
    fn no_arguments_still_terminates_both_vectors() {
        let mut cpu = SoftCpu::new(&X86_64);
        let layout = build(&mut cpu, &X86_64, STACK_BASE, STACK_SIZE, &[]).unwrap();
        assert_eq!(layout.strings, None);
        assert_eq!(words(&cpu, &X86_64, layout.sp, 3), vec![0, 0, 0]);
        assert_eq!(cpu.mem_regions().len(), 1);
    }

    #[test]
    fn words_use_target_width_and_byte_order() {
        let mut cpu = SoftCpu::new(&M68K);
        let layout = build(&mut cpu, &M68K, STACK_BASE, 0x1000, &["x".to_string()]).unwrap();
        assert_eq!(layout.sp, STACK_BASE + 0x1000 - 4 * 4);
        assert_eq!(
            cpu.mem_read_vec(layout.sp, 4).unwrap(),
            vec![0, 0, 0, 1]
        );
    }

    #[test]
    fn falls_back_when_preferred_base_is_taken() {
        let mut cpu = SoftCpu::new(&X86_64);
        cpu.mem_map(STACK_BASE, 0x1000).unwrap();
        let layout = build(&mut cpu, &X86_64, STACK_BASE, 0x2000, &[]).unwrap();
        assert_ne!(layout.base, STACK_BASE);
        assert_eq!(layout.top(), layout.base + 0x2000);
    }

    #[test]
    fn failed_push_leaves_sp_alone() {
        let mut cpu = SoftCpu::new(&X86_64);
        cpu.reg_write(Reg::Rsp, 0x9000).unwrap();
        let mut builder = StackBuilder::new(&mut cpu, &X86_64);
        let err = builder.push(7).unwrap_err();
        assert!(matches!(err, StackError::Write { addr: 0x8ff8, .. }), "{err}");
        assert_eq!(cpu.reg_read(Reg::Rsp).unwrap(), 0x9000);
    }
}
