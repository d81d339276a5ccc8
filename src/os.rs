//! Target operating systems and the (machine, OS) resolver.

use goblin::elf::header::{
    EM_68K, EM_386, EM_AARCH64, EM_ARM, EM_MIPS, EM_MIPS_RS3_LE, EM_X86_64, machine_to_str,
};
use strum::Display;

use crate::{
    arch::{self, ArchDescriptor, Endian, SyscallGate},
    error::LoadError,
    loader::Target,
    syscall::{self, SyscallTable},
};

const ELFOSABI_NONE: u8 = 0;
const ELFOSABI_LINUX: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Os {
    Linux,
}

#[derive(Debug, Clone, Copy)]
pub struct OsDescriptor {
    pub os: Os,
    pub syscalls: &'static SyscallTable,
}

impl OsDescriptor {
    pub fn name(&self) -> &'static str {
        match self.os {
            Os::Linux => "linux",
        }
    }

    /// Whether interrupt `intno` is the way `arch` enters the kernel on this
    /// OS. Any other interrupt is not a syscall.
    pub fn interrupt_is_syscall(&self, arch: &ArchDescriptor, intno: u32) -> bool {
        match (self.os, arch.gate) {
            (Os::Linux, SyscallGate::Interrupt(n)) => n == intno,
            (Os::Linux, SyscallGate::Instruction) => false,
        }
    }

    /// Whether the dedicated syscall instruction enters the kernel.
    pub fn instruction_is_syscall(&self, arch: &ArchDescriptor) -> bool {
        matches!((self.os, arch.gate), (Os::Linux, SyscallGate::Instruction))
    }
}

/// Map what the binary reports about itself to a supported cpu and OS.
///
/// Every rejection names the offending machine, class or OS so the failure
/// surfaces before anything is mapped.
pub fn resolve(target: &Target) -> Result<(&'static ArchDescriptor, OsDescriptor), LoadError> {
    let arch: &'static ArchDescriptor = match (target.machine, target.endian) {
        (EM_386, _) => &arch::X86,
        (EM_X86_64, _) => &arch::X86_64,
        (EM_ARM, Endian::Little) => &arch::ARM,
        (EM_AARCH64, Endian::Little) => &arch::AARCH64,
        (EM_MIPS, Endian::Big) => &arch::MIPS,
        (EM_MIPS, Endian::Little) | (EM_MIPS_RS3_LE, Endian::Little) => &arch::MIPSEL,
        (EM_68K, Endian::Big) => &arch::M68K,
        (machine, endian) => {
            return Err(LoadError::UnsupportedMachine {
                machine: format!("{} ({endian} endian)", machine_to_str(machine)),
            });
        }
    };

    if arch.bits != target.bits {
        return Err(LoadError::UnsupportedClass {
            machine: arch.name,
            bits: target.bits,
        });
    }

    let os = match target.os_abi {
        ELFOSABI_NONE | ELFOSABI_LINUX => Os::Linux,
        other => {
            return Err(LoadError::UnsupportedOs {
                os: os_abi_name(other).to_string(),
            });
        }
    };

    let syscalls: &'static SyscallTable = match (os, arch.name) {
        (Os::Linux, "x86") => &syscall::LINUX_X86,
        (Os::Linux, "x86_64") => &syscall::LINUX_X86_64,
        (Os::Linux, "arm") => &syscall::LINUX_ARM,
        (Os::Linux, "aarch64") => &syscall::LINUX_AARCH64,
        (Os::Linux, "mips" | "mipsel") => &syscall::LINUX_MIPS,
        (Os::Linux, "m68k") => &syscall::LINUX_M68K,
        (os, name) => {
            return Err(LoadError::UnsupportedOs {
                os: format!("{os} on {name}"),
            });
        }
    };

    Ok((arch, OsDescriptor { os, syscalls }))
}

fn os_abi_name(abi: u8) -> &'static str {
    match abi {
        1 => "HP-UX",
        2 => "NetBSD",
        6 => "Solaris",
        7 => "AIX",
        8 => "IRIX",
        9 => "FreeBSD",
        12 => "OpenBSD",
        97 => "ARM",
        255 => "standalone",
        _ => "unknown OS ABI",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Bits;

    fn target(machine: u16, bits: Bits, endian: Endian, os_abi: u8) -> Target {
        Target {
            machine,
            bits,
            endian,
            os_abi,
        }
    }

    #[test]
    fn resolves_every_supported_machine() {
        let cases = [
            (EM_386, Bits::W32, Endian::Little, "x86", "linux/x86"),
            (EM_X86_64, Bits::W64, Endian::Little, "x86_64", "linux/x86_64"),
            (EM_ARM, Bits::W32, Endian::Little, "arm", "linux/arm"),
            (EM_AARCH64, Bits::W64, Endian::Little, "aarch64", "linux/aarch64"),
            (EM_MIPS, Bits::W32, Endian::Big, "mips", "linux/mips"),
            (EM_MIPS, Bits::W32, Endian::Little, "mipsel", "linux/mips"),
            (EM_68K, Bits::W32, Endian::Big, "m68k", "linux/m68k"),
        ];
        for (machine, bits, endian, arch_name, table) in cases {
            let (arch, os) = resolve(&target(machine, bits, endian, ELFOSABI_LINUX)).unwrap();
            assert_eq!(arch.name, arch_name);
            assert_eq!(os.os, Os::Linux);
            assert_eq!(os.syscalls.name(), table);
        }
    }

    #[test]
    fn unsupported_machine_is_named() {
        let err = resolve(&target(
            goblin::elf::header::EM_PPC,
            Bits::W32,
            Endian::Big,
            0,
        ))
        .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedMachine { .. }));
        assert!(err.to_string().contains("PPC"), "{err}");
    }

    #[test]
    fn unsupported_os_is_named() {
        let err = resolve(&target(EM_X86_64, Bits::W64, Endian::Little, 9)).unwrap_err();
        assert_eq!(err.to_string(), "unsupported OS: FreeBSD");
    }

    #[test]
    fn class_must_match_the_machine() {
        let err = resolve(&target(EM_X86_64, Bits::W32, Endian::Little, 0)).unwrap_err();
        assert!(matches!(
            err,
            LoadError::UnsupportedClass {
                machine: "x86_64",
                bits: Bits::W32
            }
        ));
    }

    #[test]
    fn interrupt_routing_follows_the_gate() {
        let (x86, linux) = resolve(&target(EM_386, Bits::W32, Endian::Little, 0)).unwrap();
        assert!(linux.interrupt_is_syscall(x86, 0x80));
        assert!(!linux.interrupt_is_syscall(x86, 3));
        assert!(!linux.instruction_is_syscall(x86));

        let (x64, linux) = resolve(&target(EM_X86_64, Bits::W64, Endian::Little, 0)).unwrap();
        assert!(!linux.interrupt_is_syscall(x64, 0x80));
        assert!(linux.instruction_is_syscall(x64));
    }
}
