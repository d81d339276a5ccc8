//! One emulated process: boots an [`Executable`] into a backend and drives it
//! until it halts.

use std::{io::Write, path::Path};

use log::{debug, info, warn};

use crate::{
    arch::ArchDescriptor,
    backend::{Backend, Exit},
    config::Config,
    error::Error,
    kernel::{HostKernel, Kernel},
    loader::{self, Executable},
    mapper::{self, MappedRegion},
    os::{self, OsDescriptor},
    soft::SoftCpu,
    stack::{self, StackLayout},
    trap::{self, Action},
};

/// Bytes of code listed at the entry point before running.
const ENTRY_LISTING_LEN: u64 = 64;

/// How the program finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Status passed to `exit`, or 0 if the cpu halted on its own.
    pub code: i32,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Everything a trap handler may touch, owned in one place.
pub struct ExecutionContext<B: Backend, K: Kernel> {
    pub(crate) backend: B,
    pub(crate) kernel: K,
    pub(crate) arch: &'static ArchDescriptor,
    pub(crate) os: OsDescriptor,
    pub(crate) exe: Executable,
    pub(crate) config: Config,
    regions: Vec<MappedRegion>,
    stack: Option<StackLayout>,
}

impl<B: Backend, K: Kernel> ExecutionContext<B, K> {
    pub fn new(
        backend: B,
        kernel: K,
        arch: &'static ArchDescriptor,
        os: OsDescriptor,
        exe: Executable,
        config: Config,
    ) -> Self {
        Self {
            backend,
            kernel,
            arch,
            os,
            exe,
            config,
            regions: Vec::new(),
            stack: None,
        }
    }

    /// Install trap hooks, map the image and build the initial stack.
    /// `args` becomes the program's argv, argv[0] included.
    pub fn boot(&mut self, args: &[String]) -> Result<(), Error> {
        trap::install(&mut self.backend)?;
        self.regions = mapper::map_segments(&mut self.backend, &self.exe.segments)?;
        self.stack = Some(stack::build(
            &mut self.backend,
            self.arch,
            self.config.stack_base,
            self.config.stack_size,
            args,
        )?);

        if let Some(end) = self.regions.iter().map(|r| r.end).max() {
            self.kernel.set_break(end);
        }
        info!(
            "booted {} image, entry {:#x}",
            self.os.syscalls.name(),
            self.exe.entry
        );
        Ok(())
    }

    /// Write the boot diagnostics: entry point, a listing of the entry code,
    /// the `.data` range and the initial stack contents.
    pub fn report(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "[entry point @ {:#x}]", self.exe.entry)?;
        match self.backend.disas(self.exe.entry, ENTRY_LISTING_LEN) {
            Ok(listing) => writeln!(out, "{listing}")?,
            Err(err) => writeln!(out, "(no listing: {err})")?,
        }
        writeln!(out)?;

        if let Some(data) = &self.exe.data_segment {
            writeln!(out, "[data segment @ {:#x}..{:#x}]", data.start, data.end)?;
        }

        let Some(stack) = &self.stack else {
            return Ok(());
        };
        if let Some(addr) = stack.strings {
            writeln!(out, "[argument strings @ {addr:#x}]")?;
        }
        writeln!(out, "[initial stack @ {:#x}]", stack.sp)?;
        let len = (stack.top() - stack.sp) as usize;
        if let Ok(bytes) = self.backend.mem_read_vec(stack.sp, len) {
            let width = self.arch.word_size() as usize;
            for (i, row) in bytes.chunks(width * 2).enumerate() {
                write!(out, "{:#x}:", stack.sp + (i * width * 2) as u64)?;
                for word in row.chunks(width) {
                    write!(out, " ")?;
                    for b in word {
                        write!(out, "{b:02x}")?;
                    }
                }
                writeln!(out)?;
            }
        }
        writeln!(out)?;
        writeln!(out, "=====================================")?;
        writeln!(out, "==== Program output begins here. ====")?;
        writeln!(out, "=====================================")?;
        Ok(())
    }

    /// Run from the entry point, handling traps until the program exits, the
    /// cpu halts or a handler fails.
    pub fn execute(&mut self) -> Result<ExitStatus, Error> {
        let mut exit = self.backend.start(self.exe.entry, self.config.until);
        loop {
            let trap = match exit {
                Ok(Exit::Halted) => return Ok(ExitStatus { code: 0 }),
                Ok(Exit::Trap(trap)) => trap,
                Err(err) => {
                    self.backend.stop();
                    return Err(err.into());
                }
            };

            match trap::dispatch(self, &trap) {
                Ok(Action::Resume) => exit = self.backend.resume(),
                Ok(Action::Halt(code)) => {
                    self.backend.stop();
                    return Ok(ExitStatus { code });
                }
                Err(err) => {
                    debug!("{} trap aborted the run", trap.kind());
                    self.backend.stop();
                    return Err(err);
                }
            }
        }
    }
}

/// Load `path`, boot it with `args` as argv and run it to completion on the
/// reference backend.
pub fn run(path: &Path, args: &[String], config: Config) -> Result<ExitStatus, Error> {
    let exe = loader::load_file(path)?;
    let (arch, os) = os::resolve(&exe.target)?;
    info!("{} is a {} {} executable", path.display(), os.name(), arch.name);
    if exe.symbols.is_empty() {
        debug!("no symbol table, faults will not be symbolicated");
    }

    let print_diagnostics = config.print_diagnostics;
    let mut ctx = ExecutionContext::new(SoftCpu::new(arch), HostKernel::new(), arch, os, exe, config);
    ctx.boot(args)?;

    if print_diagnostics {
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = ctx.report(&mut stdout).and_then(|()| stdout.flush()) {
            debug!("could not write diagnostics: {err}");
        }
    }

    warn!(
        "the reference backend does not execute {} code; the run ends once its trap queue is empty",
        arch.name
    );
    ctx.execute()
}
