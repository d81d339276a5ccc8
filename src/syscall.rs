use std::{collections::HashMap, sync::LazyLock};

use strum::{Display, IntoStaticStr};

/// Every syscall any supported (OS, arch) table can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Syscall {
    Access,
    ArchPrctl,
    Brk,
    ClockGettime,
    Close,
    Execve,
    Exit,
    ExitGroup,
    Faccessat,
    Fcntl,
    Fcntl64,
    Fork,
    Fstat,
    Fstat64,
    Fstatat64,
    Getcwd,
    Getegid,
    Getegid32,
    Geteuid,
    Geteuid32,
    Getgid,
    Getgid32,
    Getpid,
    Getrandom,
    Gettid,
    Gettimeofday,
    Getuid,
    Getuid32,
    Ioctl,
    Kill,
    Lseek,
    Lstat,
    Lstat64,
    Mmap,
    Mmap2,
    Mprotect,
    Munmap,
    Newfstatat,
    Open,
    Openat,
    Prlimit64,
    Read,
    Readlink,
    Readlinkat,
    RtSigaction,
    RtSigprocmask,
    SetThreadArea,
    SetTidAddress,
    SetTls,
    Stat,
    Stat64,
    Time,
    Uname,
    Write,
    Writev,
}

/// A syscall-number to [`Syscall`] table for one (OS, arch) pair.
///
/// Numbers missing from the table are unknown to that ABI; callers must treat
/// an absent entry as an error rather than guessing.
pub struct SyscallTable {
    name: &'static str,
    entries: LazyLock<HashMap<u64, Syscall>>,
}

impl SyscallTable {
    const fn new(name: &'static str, table: fn() -> HashMap<u64, Syscall>) -> Self {
        Self {
            name,
            entries: LazyLock::new(table),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn lookup(&self, number: u64) -> Option<Syscall> {
        self.entries.get(&number).copied()
    }

    /// Reverse lookup.
    #[cfg(test)]
    pub fn number_of(&self, syscall: Syscall) -> Option<u64> {
        self.entries
            .iter()
            .filter(|(_, s)| **s == syscall)
            .map(|(n, _)| *n)
            .min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for SyscallTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyscallTable")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

pub static LINUX_X86: SyscallTable = SyscallTable::new("linux/x86", linux_x86);
pub static LINUX_X86_64: SyscallTable = SyscallTable::new("linux/x86_64", linux_x86_64);
pub static LINUX_ARM: SyscallTable = SyscallTable::new("linux/arm", linux_arm);
pub static LINUX_AARCH64: SyscallTable = SyscallTable::new("linux/aarch64", linux_aarch64);
pub static LINUX_MIPS: SyscallTable = SyscallTable::new("linux/mips", linux_mips_o32);
pub static LINUX_M68K: SyscallTable = SyscallTable::new("linux/m68k", linux_m68k);

fn linux_x86() -> HashMap<u64, Syscall> {
    use Syscall::*;
    [
        (1, Exit),
        (2, Fork),
        (3, Read),
        (4, Write),
        (5, Open),
        (6, Close),
        (11, Execve),
        (13, Time),
        (19, Lseek),
        (20, Getpid),
        (24, Getuid),
        (33, Access),
        (37, Kill),
        (45, Brk),
        (47, Getgid),
        (49, Geteuid),
        (50, Getegid),
        (54, Ioctl),
        (55, Fcntl),
        (78, Gettimeofday),
        (85, Readlink),
        (90, Mmap), // old_mmap, arguments in a struct
        (91, Munmap),
        (106, Stat),
        (107, Lstat),
        (108, Fstat),
        (122, Uname),
        (125, Mprotect),
        (146, Writev),
        (174, RtSigaction),
        (175, RtSigprocmask),
        (183, Getcwd),
        (192, Mmap2),
        (195, Stat64),
        (196, Lstat64),
        (197, Fstat64),
        (199, Getuid32),
        (200, Getgid32),
        (201, Geteuid32),
        (202, Getegid32),
        (221, Fcntl64),
        (224, Gettid),
        (243, SetThreadArea),
        (252, ExitGroup),
        (258, SetTidAddress),
        (265, ClockGettime),
        (295, Openat),
        (300, Fstatat64),
        (305, Readlinkat),
        (307, Faccessat),
        (340, Prlimit64),
        (355, Getrandom),
    ]
    .into_iter()
    .collect()
}

fn linux_x86_64() -> HashMap<u64, Syscall> {
    use Syscall::*;
    [
        (0, Read),
        (1, Write),
        (2, Open),
        (3, Close),
        (4, Stat),
        (5, Fstat),
        (6, Lstat),
        (8, Lseek),
        (9, Mmap),
        (10, Mprotect),
        (11, Munmap),
        (12, Brk),
        (13, RtSigaction),
        (14, RtSigprocmask),
        (16, Ioctl),
        (20, Writev),
        (21, Access),
        (39, Getpid),
        (57, Fork),
        (59, Execve),
        (60, Exit),
        (62, Kill),
        (63, Uname),
        (72, Fcntl),
        (79, Getcwd),
        (89, Readlink),
        (96, Gettimeofday),
        (102, Getuid),
        (104, Getgid),
        (107, Geteuid),
        (108, Getegid),
        (158, ArchPrctl),
        (186, Gettid),
        (201, Time),
        (218, SetTidAddress),
        (228, ClockGettime),
        (231, ExitGroup),
        (257, Openat),
        (262, Newfstatat),
        (267, Readlinkat),
        (269, Faccessat),
        (302, Prlimit64),
        (318, Getrandom),
    ]
    .into_iter()
    .collect()
}

fn linux_arm() -> HashMap<u64, Syscall> {
    use Syscall::*;
    [
        (1, Exit),
        (2, Fork),
        (3, Read),
        (4, Write),
        (5, Open),
        (6, Close),
        (11, Execve),
        (19, Lseek),
        (20, Getpid),
        (24, Getuid),
        (33, Access),
        (37, Kill),
        (45, Brk),
        (47, Getgid),
        (49, Geteuid),
        (50, Getegid),
        (54, Ioctl),
        (55, Fcntl),
        (78, Gettimeofday),
        (85, Readlink),
        (91, Munmap),
        (122, Uname),
        (125, Mprotect),
        (146, Writev),
        (174, RtSigaction),
        (175, RtSigprocmask),
        (183, Getcwd),
        (192, Mmap2),
        (195, Stat64),
        (196, Lstat64),
        (197, Fstat64),
        (199, Getuid32),
        (200, Getgid32),
        (201, Geteuid32),
        (202, Getegid32),
        (221, Fcntl64),
        (224, Gettid),
        (248, ExitGroup),
        (256, SetTidAddress),
        (263, ClockGettime),
        (322, Openat),
        (327, Fstatat64),
        (332, Readlinkat),
        (334, Faccessat),
        (369, Prlimit64),
        (384, Getrandom),
        (0x0f_0005, SetTls), // __ARM_NR_set_tls
    ]
    .into_iter()
    .collect()
}

fn linux_aarch64() -> HashMap<u64, Syscall> {
    use Syscall::*;
    [
        (17, Getcwd),
        (25, Fcntl),
        (29, Ioctl),
        (48, Faccessat),
        (56, Openat),
        (57, Close),
        (62, Lseek),
        (63, Read),
        (64, Write),
        (66, Writev),
        (78, Readlinkat),
        (79, Newfstatat),
        (80, Fstat),
        (93, Exit),
        (94, ExitGroup),
        (96, SetTidAddress),
        (113, ClockGettime),
        (129, Kill),
        (134, RtSigaction),
        (135, RtSigprocmask),
        (160, Uname),
        (169, Gettimeofday),
        (172, Getpid),
        (174, Getuid),
        (175, Geteuid),
        (176, Getgid),
        (177, Getegid),
        (178, Gettid),
        (214, Brk),
        (215, Munmap),
        (221, Execve),
        (222, Mmap),
        (226, Mprotect),
        (261, Prlimit64),
        (278, Getrandom),
    ]
    .into_iter()
    .collect()
}

/// o32 numbers start at 4000.
fn linux_mips_o32() -> HashMap<u64, Syscall> {
    use Syscall::*;
    [
        (1, Exit),
        (2, Fork),
        (3, Read),
        (4, Write),
        (5, Open),
        (6, Close),
        (11, Execve),
        (13, Time),
        (19, Lseek),
        (20, Getpid),
        (24, Getuid),
        (33, Access),
        (37, Kill),
        (45, Brk),
        (47, Getgid),
        (49, Geteuid),
        (50, Getegid),
        (54, Ioctl),
        (55, Fcntl),
        (78, Gettimeofday),
        (85, Readlink),
        (90, Mmap),
        (91, Munmap),
        (106, Stat),
        (107, Lstat),
        (108, Fstat),
        (122, Uname),
        (125, Mprotect),
        (146, Writev),
        (194, RtSigaction),
        (195, RtSigprocmask),
        (203, Getcwd),
        (210, Mmap2),
        (213, Stat64),
        (214, Lstat64),
        (215, Fstat64),
        (220, Fcntl64),
        (222, Gettid),
        (246, ExitGroup),
        (252, SetTidAddress),
        (263, ClockGettime),
        (283, SetThreadArea),
        (288, Openat),
        (293, Fstatat64),
        (298, Readlinkat),
        (300, Faccessat),
        (338, Prlimit64),
        (353, Getrandom),
    ]
    .into_iter()
    .map(|(n, s)| (4000 + n, s))
    .collect()
}

fn linux_m68k() -> HashMap<u64, Syscall> {
    use Syscall::*;
    [
        (1, Exit),
        (2, Fork),
        (3, Read),
        (4, Write),
        (5, Open),
        (6, Close),
        (11, Execve),
        (13, Time),
        (19, Lseek),
        (20, Getpid),
        (24, Getuid),
        (33, Access),
        (37, Kill),
        (45, Brk),
        (47, Getgid),
        (49, Geteuid),
        (50, Getegid),
        (54, Ioctl),
        (55, Fcntl),
        (78, Gettimeofday),
        (85, Readlink),
        (90, Mmap), // old_mmap, arguments in a struct
        (91, Munmap),
        (106, Stat),
        (107, Lstat),
        (108, Fstat),
        (122, Uname),
        (125, Mprotect),
        (146, Writev),
        (174, RtSigaction),
        (175, RtSigprocmask),
        (183, Getcwd),
        (192, Mmap2),
        (195, Stat64),
        (196, Lstat64),
        (197, Fstat64),
        (199, Getuid32),
        (200, Getgid32),
        (201, Geteuid32),
        (202, Getegid32),
        (221, Gettid),
        (239, Fcntl64),
        (247, ExitGroup),
        (253, SetTidAddress),
        (260, ClockGettime),
        (288, Openat),
        (293, Fstatat64),
        (298, Readlinkat),
        (300, Faccessat),
        (334, SetThreadArea),
        (339, Prlimit64),
        (352, Getrandom),
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_exit_resolve_on_every_table() {
        let cases: [(&SyscallTable, u64, u64); 6] = [
            (&LINUX_X86, 4, 1),
            (&LINUX_X86_64, 1, 60),
            (&LINUX_ARM, 4, 1),
            (&LINUX_AARCH64, 64, 93),
            (&LINUX_MIPS, 4004, 4001),
            (&LINUX_M68K, 4, 1),
        ];
        for (table, write, exit) in cases {
            assert_eq!(table.lookup(write), Some(Syscall::Write), "{}", table.name());
            assert_eq!(table.lookup(exit), Some(Syscall::Exit), "{}", table.name());
        }
    }

    #[test]
    fn numbers_outside_the_table_are_unknown() {
        assert_eq!(LINUX_X86_64.lookup(9999), None);
        assert_eq!(LINUX_MIPS.lookup(4), None);
        assert_eq!(LINUX_AARCH64.lookup(1), None);
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(Syscall::ExitGroup.to_string(), "exit_group");
        let name: &'static str = Syscall::SetTidAddress.into();
        assert_eq!(name, "set_tid_address");
        assert_eq!(Syscall::Prlimit64.to_string(), "prlimit64");
    }

    #[test]
    fn reverse_lookup_finds_the_number() {
        assert_eq!(LINUX_X86_64.number_of(Syscall::ExitGroup), Some(231));
        assert_eq!(LINUX_MIPS.number_of(Syscall::Write), Some(4004));
        assert_eq!(LINUX_AARCH64.number_of(Syscall::Open), None);
    }
}
