mod arch;
mod backend;
mod config;
mod error;
mod kernel;
mod loader;
mod mapper;
mod memory;
mod os;
mod process;
mod soft;
mod stack;
mod symbols;
mod syscall;
mod trap;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::config::{Config, STACK_BASE, STACK_SIZE, UnknownSyscallPolicy};

/// Boot a Linux executable into an emulated cpu and service its syscalls.
#[derive(Debug, Parser)]
#[command(name = "ziggurat", version)]
struct Cli {
    /// Executable to run
    exe: PathBuf,

    /// Arguments passed to the program after argv[0]
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Preferred stack address in hex [default: 0x60000000]
    #[arg(long, value_parser = parse_hex)]
    stack_base: Option<u64>,

    /// Stack size in bytes, hex [default: 0x800000]
    #[arg(long, value_parser = parse_hex)]
    stack_size: Option<u64>,

    /// Stop when execution reaches this address (hex)
    #[arg(long, value_parser = parse_hex)]
    until: Option<u64>,

    /// What to do with syscall numbers the target ABI does not define
    #[arg(long, value_enum, default_value_t = UnknownSyscallPolicy::Fatal)]
    unknown_syscall: UnknownSyscallPolicy,

    /// Do not list the faulting code on invalid memory accesses
    #[arg(long)]
    no_fault_disasm: bool,

    /// Do not print the entry point and initial stack before running
    #[arg(short, long)]
    quiet: bool,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            stack_base: self.stack_base.unwrap_or(STACK_BASE),
            stack_size: self.stack_size.unwrap_or(STACK_SIZE),
            unknown_syscall: self.unknown_syscall,
            disassemble_faults: !self.no_fault_disasm,
            until: self.until.unwrap_or(0),
            print_diagnostics: !self.quiet,
        }
    }

    /// argv as the program sees it: the executable path, then its arguments.
    fn argv(&self) -> Vec<String> {
        std::iter::once(self.exe.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(s, 16).map_err(|e| format!("invalid hex number: {e}"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_module("ziggurat", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let status = process::run(&cli.exe, &cli.argv(), cli.config())
        .with_context(|| format!("failed to run {}", cli.exe.display()))?;
    if !status.success() {
        std::process::exit(status.code);
    }
    Ok(())
}
