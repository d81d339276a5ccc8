use std::path::PathBuf;

use thiserror::Error;

use crate::{
    arch::Bits,
    backend::{Access, BackendError, MemError},
    syscall::Syscall,
};

/// Everything that can end a run early.
///
/// Load errors happen before the backend exists; map and stack errors abort
/// startup; the rest are raised by trap handlers while the program runs.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    UnknownSyscall(#[from] UnknownSyscallError),
    #[error(transparent)]
    Fault(#[from] FaultError),
    #[error("syscall {syscall} failed: {source:#}")]
    Syscall {
        syscall: Syscall,
        source: anyhow::Error,
    },
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse executable: {0}")]
    Parse(#[from] goblin::error::Error),
    #[error("unsupported object format: {0}")]
    UnsupportedFormat(String),
    #[error("unsupported ELF class: {bits} {machine}")]
    UnsupportedClass { machine: &'static str, bits: Bits },
    #[error("unsupported machine: {machine}")]
    UnsupportedMachine { machine: String },
    #[error("unsupported OS: {os}")]
    UnsupportedOs { os: String },
    #[error("malformed executable: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("segment at {addr:#x} ({len:#x} bytes) runs past the end of the address space")]
    Overflow { addr: u64, len: usize },
    #[error("failed to map region {start:#x}..{end:#x}: {source}")]
    Region {
        start: u64,
        end: u64,
        source: MemError,
    },
    #[error("failed to write segment at {addr:#x} ({len:#x} bytes): {source}")]
    Write {
        addr: u64,
        len: usize,
        source: MemError,
    },
}

#[derive(Debug, Error)]
pub enum StackError {
    #[error("failed to allocate {size:#x} bytes of {what}: {source}")]
    Alloc {
        what: &'static str,
        size: u64,
        source: MemError,
    },
    #[error("failed to write stack at {addr:#x}: {source}")]
    Write { addr: u64, source: MemError },
    #[error("failed to access stack pointer: {0}")]
    Register(#[source] BackendError),
}

#[derive(Debug, Error)]
#[error("{os}/{arch} has no syscall {number}")]
pub struct UnknownSyscallError {
    pub number: u64,
    pub arch: &'static str,
    pub os: &'static str,
}

/// An access the emulated program made to memory it does not own.
#[derive(Debug, Error)]
#[error("invalid {access}: @{addr:#x}, {size:#x} = {value:#x} (pc: {pc:#x}{})", symbol_suffix(.symbol))]
pub struct FaultError {
    pub access: Access,
    pub addr: u64,
    pub size: usize,
    pub value: i64,
    pub pc: u64,
    pub symbol: String,
}

fn symbol_suffix(symbol: &str) -> String {
    if symbol.is_empty() {
        String::new()
    } else {
        format!(" {symbol}")
    }
}
