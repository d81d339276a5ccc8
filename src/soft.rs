//! Reference backend: real memory and registers, no instruction decoder.
//!
//! `SoftCpu` keeps the full [`Backend`] contract for everything except
//! instruction execution. Traps are queued with [`SoftCpu::raise`] and handed
//! out in order by `start`/`resume`; when the queue drains the cpu halts.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt::Write,
    ops::Range,
};

use crate::{
    arch::{ArchDescriptor, Reg},
    backend::{Backend, BackendError, Exit, MemError, Trap, TrapKind},
    memory::AddressSpace,
};

const PAGE_SIZE: u64 = 0x1000;

pub struct SoftCpu {
    arch: &'static ArchDescriptor,
    memory: AddressSpace,
    regs: HashMap<Reg, u64>,
    hooks: HashSet<TrapKind>,
    pending: VecDeque<Trap>,
    started: bool,
    halted: bool,
}

impl SoftCpu {
    pub fn new(arch: &'static ArchDescriptor) -> Self {
        Self {
            arch,
            memory: AddressSpace::new(PAGE_SIZE),
            regs: arch.registers.iter().map(|&r| (r, 0)).collect(),
            hooks: HashSet::new(),
            pending: VecDeque::new(),
            started: false,
            halted: false,
        }
    }

    /// Queue a trap to be delivered by the next `start`/`resume`.
    pub fn raise(&mut self, trap: Trap) {
        self.pending.push_back(trap);
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn hooks(&self) -> &HashSet<TrapKind> {
        &self.hooks
    }

    fn next_exit(&mut self) -> Result<Exit, BackendError> {
        if self.halted {
            return Ok(Exit::Halted);
        }
        match self.pending.pop_front() {
            Some(trap) if self.hooks.contains(&trap.kind()) => Ok(Exit::Trap(trap)),
            Some(trap) => {
                self.halted = true;
                Err(BackendError::Unhooked(trap.kind()))
            }
            None => {
                self.halted = true;
                Ok(Exit::Halted)
            }
        }
    }
}

impl Backend for SoftCpu {
    fn page_size(&self) -> u64 {
        self.memory.page_size()
    }

    fn address_limit(&self) -> u64 {
        self.arch.address_limit()
    }

    fn mem_map(&mut self, addr: u64, size: u64) -> Result<(), MemError> {
        let end = addr
            .checked_add(size)
            .ok_or(MemError::AddressOverflow { addr, size })?;
        if end > self.address_limit() {
            return Err(MemError::AddressOverflow { addr, size });
        }
        self.memory.map(addr, size)
    }

    fn mem_regions(&self) -> Vec<Range<u64>> {
        self.memory.ranges()
    }

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError> {
        self.memory.read(addr, buf)
    }

    fn mem_write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemError> {
        self.memory.write(addr, data)
    }

    fn reg_read(&self, reg: Reg) -> Result<u64, BackendError> {
        self.regs
            .get(&reg)
            .copied()
            .ok_or(BackendError::NoRegister(reg))
    }

    fn reg_write(&mut self, reg: Reg, value: u64) -> Result<(), BackendError> {
        let slot = self
            .regs
            .get_mut(&reg)
            .ok_or(BackendError::NoRegister(reg))?;
        *slot = self.arch.truncate(value);
        Ok(())
    }

    fn hook_add(&mut self, kind: TrapKind) -> Result<(), BackendError> {
        if self.started {
            return Err(BackendError::HooksFrozen);
        }
        if !self.hooks.insert(kind) {
            return Err(BackendError::HookInstalled(kind));
        }
        Ok(())
    }

    fn disas(&self, addr: u64, len: u64) -> Result<String, BackendError> {
        let bytes = self.mem_read_vec(addr, len as usize)?;
        let mut out = String::new();
        for (i, chunk) in bytes.chunks(8).enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = write!(out, "{:#x}:", addr + (i * 8) as u64);
            for b in chunk {
                let _ = write!(out, " {b:02x}");
            }
        }
        Ok(out)
    }

    fn start(&mut self, begin: u64, until: u64) -> Result<Exit, BackendError> {
        self.started = true;
        self.reg_write(self.arch.pc, begin)?;
        if until != 0 && begin == until {
            self.halted = true;
        }
        self.next_exit()
    }

    fn resume(&mut self) -> Result<Exit, BackendError> {
        if !self.started {
            return Err(BackendError::NotStarted);
        }
        self.next_exit()
    }

    fn stop(&mut self) {
        self.halted = true;
        self.pending.clear();
    }
}
