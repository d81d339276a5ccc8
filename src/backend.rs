//! The seam between process bootstrapping and the CPU engine.
//!
//! Everything above this module talks to an engine only through [`Backend`]:
//! symbolic register access, page mappings, byte-level memory access, trap
//! registration and a blocking run loop that hands traps back to the caller
//! as [`Exit`] values instead of invoking callbacks.

use std::ops::Range;

use strum::Display;
use thiserror::Error;

use crate::arch::Reg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Access {
    Read,
    Write,
    Fetch,
}

/// The trap classes an engine can deliver to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TrapKind {
    InvalidMemory,
    Interrupt,
    SyscallInsn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    /// Access to an unmapped or protected address.
    InvalidMemory {
        access: Access,
        addr: u64,
        size: usize,
        value: i64,
    },
    Interrupt(u32),
    /// The architecture's dedicated syscall instruction.
    Syscall,
}

impl Trap {
    pub fn kind(&self) -> TrapKind {
        match self {
            Trap::InvalidMemory { .. } => TrapKind::InvalidMemory,
            Trap::Interrupt(_) => TrapKind::Interrupt,
            Trap::Syscall => TrapKind::SyscallInsn,
        }
    }
}

/// Why a blocking run returned control to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    Trap(Trap),
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemError {
    #[error("address overflow at {addr:#x} (size {size:#x})")]
    AddressOverflow { addr: u64, size: u64 },
    #[error("no mapping covers {addr:#x} (size {size:#x})")]
    Unmapped { addr: u64, size: u64 },
    #[error("mapping at {addr:#x} (size {size:#x}) overlaps an existing mapping")]
    Overlap { addr: u64, size: u64 },
    #[error("mapping at {addr:#x} (size {size:#x}) is not page aligned")]
    Unaligned { addr: u64, size: u64 },
    #[error("no free range of {size:#x} bytes below {limit:#x}")]
    NoSpace { size: u64, limit: u64 },
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Mem(#[from] MemError),
    #[error("register {0} does not exist on this cpu")]
    NoRegister(Reg),
    #[error("trap hooks cannot change once execution has started")]
    HooksFrozen,
    #[error("{0} hook is already installed")]
    HookInstalled(TrapKind),
    #[error("{0} trap raised with no hook installed")]
    Unhooked(TrapKind),
    #[error("execution has not been started")]
    NotStarted,
}

pub trait Backend {
    fn page_size(&self) -> u64;

    /// Highest address (exclusive) the emulated cpu can address.
    fn address_limit(&self) -> u64;

    /// Map `size` bytes at `addr`. Both must be page aligned.
    fn mem_map(&mut self, addr: u64, size: u64) -> Result<(), MemError>;

    /// Currently mapped ranges, sorted by start address.
    fn mem_regions(&self) -> Vec<Range<u64>>;

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError>;

    fn mem_write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemError>;

    fn reg_read(&self, reg: Reg) -> Result<u64, BackendError>;

    fn reg_write(&mut self, reg: Reg, value: u64) -> Result<(), BackendError>;

    /// Ask the engine to deliver traps of `kind` to the host.
    fn hook_add(&mut self, kind: TrapKind) -> Result<(), BackendError>;

    /// Human readable listing of `len` bytes of code at `addr`.
    fn disas(&self, addr: u64, len: u64) -> Result<String, BackendError>;

    /// Begin execution at `begin`. Blocks until a hooked trap fires or the cpu
    /// halts. `until == 0` runs without an end address.
    fn start(&mut self, begin: u64, until: u64) -> Result<Exit, BackendError>;

    /// Continue after the trap last returned by `start`/`resume`.
    fn resume(&mut self) -> Result<Exit, BackendError>;

    fn stop(&mut self);

    fn mem_read_vec(&self, addr: u64, len: usize) -> Result<Vec<u8>, MemError> {
        let mut buf = vec![0u8; len];
        self.mem_read(addr, &mut buf)?;
        Ok(buf)
    }

    /// Map `size` bytes at `preferred`, or anywhere free if that range is
    /// unavailable (or `preferred` is zero). Returns the mapped address.
    fn mmap(&mut self, preferred: u64, size: u64) -> Result<u64, MemError> {
        let size = align_up(size.max(1), self.page_size());
        if preferred != 0 {
            let addr = align_down(preferred, self.page_size());
            match self.mem_map(addr, size) {
                Ok(()) => return Ok(addr),
                Err(err) => log::debug!("preferred mapping at {addr:#x} unavailable: {err}"),
            }
        }
        let addr = self.find_free(size)?;
        self.mem_map(addr, size)?;
        Ok(addr)
    }

    /// First page-aligned gap of at least `size` bytes above the first
    /// sixteen pages.
    fn find_free(&self, size: u64) -> Result<u64, MemError> {
        let page = self.page_size();
        let size = align_up(size.max(1), page);
        let limit = self.address_limit();
        let mut candidate = page * 16;

        for range in self.mem_regions() {
            if candidate
                .checked_add(size)
                .is_some_and(|end| end <= range.start)
            {
                return Ok(candidate);
            }
            if range.end > candidate {
                candidate = align_up(range.end, page);
            }
        }

        match candidate.checked_add(size) {
            Some(end) if end <= limit => Ok(candidate),
            _ => Err(MemError::NoSpace { size, limit }),
        }
    }
}

pub fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

pub fn align_up(value: u64, align: u64) -> u64 {
    value.saturating_add(align - 1) & !(align - 1)
}
