use clap::ValueEnum;

pub const STACK_BASE: u64 = 0x6000_0000;
pub const STACK_SIZE: u64 = 0x0080_0000;

/// What to do when a program asks for a syscall number its ABI lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UnknownSyscallPolicy {
    /// Stop the run with an unknown-syscall error.
    #[default]
    Fatal,
    /// Report it, return -ENOSYS to the program and keep going.
    Enosys,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Preferred stack address; another free range is used if it is taken.
    pub stack_base: u64,
    pub stack_size: u64,
    pub unknown_syscall: UnknownSyscallPolicy,
    /// Print a listing of the faulting code on invalid memory accesses.
    pub disassemble_faults: bool,
    /// Address to stop execution at, or 0 to run until the program halts.
    pub until: u64,
    /// Print the entry point, entry listing and initial stack before running.
    pub print_diagnostics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_base: STACK_BASE,
            stack_size: STACK_SIZE,
            unknown_syscall: UnknownSyscallPolicy::default(),
            disassemble_faults: true,
            until: 0,
            print_diagnostics: true,
        }
    }
}
