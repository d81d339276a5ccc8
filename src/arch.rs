//! Static descriptions of every supported cpu: register roles, pointer width,
//! byte order and how the Linux syscall ABI maps onto registers.

use strum::Display;

/// Symbolic register ids shared by all backends.
///
/// Names are per-architecture; a backend only answers for the registers
/// listed in its [`ArchDescriptor::registers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Reg {
    // x86
    Eax,
    Ebx,
    Ecx,
    Edx,
    Esi,
    Edi,
    Ebp,
    Esp,
    Eip,
    // x86_64
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    Rip,
    R8,
    R9,
    R10,
    // arm
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    // aarch64
    X0,
    X1,
    X2,
    X3,
    X4,
    X5,
    X8,
    // mips
    V0,
    A0,
    A1,
    A2,
    A3,
    // m68k
    D0,
    D1,
    D2,
    D3,
    D4,
    D5,
    // arm, aarch64, mips, m68k
    Sp,
    Pc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bits {
    W32,
    W64,
}

impl Bits {
    pub fn bytes(self) -> u64 {
        match self {
            Bits::W32 => 4,
            Bits::W64 => 8,
        }
    }
}

impl std::fmt::Display for Bits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bits::W32 => f.write_str("32-bit"),
            Bits::W64 => f.write_str("64-bit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
}

/// How a program enters the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallGate {
    /// A dedicated instruction (`syscall` on x86_64).
    Instruction,
    /// A software interrupt delivered with this interrupt number.
    Interrupt(u32),
}

#[derive(Debug)]
pub struct ArchDescriptor {
    pub name: &'static str,
    pub bits: Bits,
    pub endian: Endian,
    pub sp: Reg,
    pub pc: Reg,
    pub syscall_num: Reg,
    pub syscall_ret: Reg,
    /// Syscall arguments passed in registers, in order.
    pub syscall_args: &'static [Reg],
    /// Offset from SP of the first syscall argument that did not fit in
    /// `syscall_args` (MIPS o32 passes arguments 5..8 on the stack).
    pub stack_args_offset: Option<u64>,
    /// Register set to 1 on error and 0 on success, with the positive errno
    /// left in the return register.
    pub error_flag: Option<Reg>,
    /// Host errno to target errno, for numbers that differ. Unlisted numbers
    /// are the same on both sides.
    pub errnos: &'static [(i32, i32)],
    pub gate: SyscallGate,
    pub registers: &'static [Reg],
}

impl ArchDescriptor {
    pub fn word_size(&self) -> u64 {
        self.bits.bytes()
    }

    /// Encode `value` as one pointer-sized word in target byte order.
    /// Values wider than the word are truncated.
    pub fn encode_word(&self, value: u64) -> Vec<u8> {
        match (self.bits, self.endian) {
            (Bits::W32, Endian::Little) => (value as u32).to_le_bytes().to_vec(),
            (Bits::W32, Endian::Big) => (value as u32).to_be_bytes().to_vec(),
            (Bits::W64, Endian::Little) => value.to_le_bytes().to_vec(),
            (Bits::W64, Endian::Big) => value.to_be_bytes().to_vec(),
        }
    }

    /// Decode one pointer-sized word from the front of `bytes`.
    pub fn decode_word(&self, bytes: &[u8]) -> Option<u64> {
        let width = self.word_size() as usize;
        let word = bytes.get(..width)?;
        let value = match (self.bits, self.endian) {
            (Bits::W32, Endian::Little) => u32::from_le_bytes(word.try_into().ok()?) as u64,
            (Bits::W32, Endian::Big) => u32::from_be_bytes(word.try_into().ok()?) as u64,
            (Bits::W64, Endian::Little) => u64::from_le_bytes(word.try_into().ok()?),
            (Bits::W64, Endian::Big) => u64::from_be_bytes(word.try_into().ok()?),
        };
        Some(value)
    }

    /// Translate a host errno into the number this architecture's kernel
    /// would have returned.
    pub fn target_errno(&self, host: i32) -> i32 {
        self.errnos
            .iter()
            .find(|(from, _)| *from == host)
            .map_or(host, |(_, to)| *to)
    }

    /// Mask a register value down to the architecture's width.
    pub fn truncate(&self, value: u64) -> u64 {
        match self.bits {
            Bits::W32 => value & 0xffff_ffff,
            Bits::W64 => value,
        }
    }

    pub fn address_limit(&self) -> u64 {
        match self.bits {
            Bits::W32 => 1 << 32,
            // 47-bit user space, as on Linux x86_64/aarch64
            Bits::W64 => 1 << 47,
        }
    }
}

pub static X86: ArchDescriptor = ArchDescriptor {
    name: "x86",
    bits: Bits::W32,
    endian: Endian::Little,
    sp: Reg::Esp,
    pc: Reg::Eip,
    syscall_num: Reg::Eax,
    syscall_ret: Reg::Eax,
    syscall_args: &[Reg::Ebx, Reg::Ecx, Reg::Edx, Reg::Esi, Reg::Edi, Reg::Ebp],
    stack_args_offset: None,
    error_flag: None,
    errnos: &[],
    gate: SyscallGate::Interrupt(0x80),
    registers: &[
        Reg::Eax,
        Reg::Ebx,
        Reg::Ecx,
        Reg::Edx,
        Reg::Esi,
        Reg::Edi,
        Reg::Ebp,
        Reg::Esp,
        Reg::Eip,
    ],
};

pub static X86_64: ArchDescriptor = ArchDescriptor {
    name: "x86_64",
    bits: Bits::W64,
    endian: Endian::Little,
    sp: Reg::Rsp,
    pc: Reg::Rip,
    syscall_num: Reg::Rax,
    syscall_ret: Reg::Rax,
    syscall_args: &[Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::R10, Reg::R8, Reg::R9],
    stack_args_offset: None,
    error_flag: None,
    errnos: &[],
    gate: SyscallGate::Instruction,
    registers: &[
        Reg::Rax,
        Reg::Rbx,
        Reg::Rcx,
        Reg::Rdx,
        Reg::Rsi,
        Reg::Rdi,
        Reg::Rbp,
        Reg::Rsp,
        Reg::Rip,
        Reg::R8,
        Reg::R9,
        Reg::R10,
    ],
};

pub static ARM: ArchDescriptor = ArchDescriptor {
    name: "arm",
    bits: Bits::W32,
    endian: Endian::Little,
    sp: Reg::Sp,
    pc: Reg::Pc,
    syscall_num: Reg::R7,
    syscall_ret: Reg::R0,
    syscall_args: &[Reg::R0, Reg::R1, Reg::R2, Reg::R3, Reg::R4, Reg::R5, Reg::R6],
    stack_args_offset: None,
    error_flag: None,
    errnos: &[],
    // svc raises EXCP_SWI
    gate: SyscallGate::Interrupt(2),
    registers: &[
        Reg::R0,
        Reg::R1,
        Reg::R2,
        Reg::R3,
        Reg::R4,
        Reg::R5,
        Reg::R6,
        Reg::R7,
        Reg::Sp,
        Reg::Pc,
    ],
};

pub static AARCH64: ArchDescriptor = ArchDescriptor {
    name: "aarch64",
    bits: Bits::W64,
    endian: Endian::Little,
    sp: Reg::Sp,
    pc: Reg::Pc,
    syscall_num: Reg::X8,
    syscall_ret: Reg::X0,
    syscall_args: &[Reg::X0, Reg::X1, Reg::X2, Reg::X3, Reg::X4, Reg::X5],
    stack_args_offset: None,
    error_flag: None,
    errnos: &[],
    gate: SyscallGate::Interrupt(2),
    registers: &[
        Reg::X0,
        Reg::X1,
        Reg::X2,
        Reg::X3,
        Reg::X4,
        Reg::X5,
        Reg::X8,
        Reg::Sp,
        Reg::Pc,
    ],
};

/// Errnos MIPS numbers differently from the generic Linux table.
const MIPS_ERRNOS: &[(i32, i32)] = &[
    (libc::EDEADLK, 45),
    (libc::ENAMETOOLONG, 78),
    (libc::ENOLCK, 46),
    (libc::ENOSYS, 89),
    (libc::ENOTEMPTY, 93),
    (libc::ELOOP, 90),
    (libc::ENOMSG, 35),
    (libc::EIDRM, 36),
    (libc::ECHRNG, 37),
    (libc::EL2NSYNC, 38),
    (libc::EL3HLT, 39),
    (libc::EL3RST, 40),
    (libc::ELNRNG, 41),
    (libc::EUNATCH, 42),
    (libc::ENOCSI, 43),
    (libc::EL2HLT, 44),
    (libc::EBADE, 50),
    (libc::EBADR, 51),
    (libc::EXFULL, 52),
    (libc::ENOANO, 53),
    (libc::EBADRQC, 54),
    (libc::EBADSLT, 55),
    (libc::EMULTIHOP, 74),
    (libc::EBADMSG, 77),
    (libc::EOVERFLOW, 79),
    (libc::ENOTUNIQ, 80),
    (libc::EBADFD, 81),
    (libc::EREMCHG, 82),
    (libc::ELIBACC, 83),
    (libc::ELIBBAD, 84),
    (libc::ELIBSCN, 85),
    (libc::ELIBMAX, 86),
    (libc::ELIBEXEC, 87),
    (libc::EILSEQ, 88),
    (libc::ERESTART, 91),
    (libc::ESTRPIPE, 92),
    (libc::EUSERS, 94),
    (libc::ENOTSOCK, 95),
    (libc::EDESTADDRREQ, 96),
    (libc::EMSGSIZE, 97),
    (libc::EPROTOTYPE, 98),
    (libc::ENOPROTOOPT, 99),
    (libc::EPROTONOSUPPORT, 120),
    (libc::ESOCKTNOSUPPORT, 121),
    (libc::EOPNOTSUPP, 122),
    (libc::EPFNOSUPPORT, 123),
    (libc::EAFNOSUPPORT, 124),
    (libc::EADDRINUSE, 125),
    (libc::EADDRNOTAVAIL, 126),
    (libc::ENETDOWN, 127),
    (libc::ENETUNREACH, 128),
    (libc::ENETRESET, 129),
    (libc::ECONNABORTED, 130),
    (libc::ECONNRESET, 131),
    (libc::ENOBUFS, 132),
    (libc::EISCONN, 133),
    (libc::ENOTCONN, 134),
    (libc::ESHUTDOWN, 143),
    (libc::ETOOMANYREFS, 144),
    (libc::ETIMEDOUT, 145),
    (libc::ECONNREFUSED, 146),
    (libc::EHOSTDOWN, 147),
    (libc::EHOSTUNREACH, 148),
    (libc::EALREADY, 149),
    (libc::EINPROGRESS, 150),
    (libc::ESTALE, 151),
    (libc::EUCLEAN, 135),
    (libc::ENOTNAM, 137),
    (libc::ENAVAIL, 138),
    (libc::EISNAM, 139),
    (libc::EREMOTEIO, 140),
    (libc::EDQUOT, 1133),
    (libc::ENOMEDIUM, 159),
    (libc::EMEDIUMTYPE, 160),
    (libc::ECANCELED, 158),
    (libc::ENOKEY, 161),
    (libc::EKEYEXPIRED, 162),
    (libc::EKEYREVOKED, 163),
    (libc::EKEYREJECTED, 164),
    (libc::EOWNERDEAD, 165),
    (libc::ENOTRECOVERABLE, 166),
    (libc::ERFKILL, 167),
    (libc::EHWPOISON, 168),
];

const MIPS_O32: ArchDescriptor = ArchDescriptor {
    name: "mips",
    bits: Bits::W32,
    endian: Endian::Big,
    sp: Reg::Sp,
    pc: Reg::Pc,
    syscall_num: Reg::V0,
    syscall_ret: Reg::V0,
    syscall_args: &[Reg::A0, Reg::A1, Reg::A2, Reg::A3],
    stack_args_offset: Some(16),
    error_flag: Some(Reg::A3),
    errnos: MIPS_ERRNOS,
    // EXCP_SYSCALL
    gate: SyscallGate::Interrupt(17),
    registers: &[
        Reg::V0,
        Reg::A0,
        Reg::A1,
        Reg::A2,
        Reg::A3,
        Reg::Sp,
        Reg::Pc,
    ],
};

pub static MIPS: ArchDescriptor = MIPS_O32;

pub static MIPSEL: ArchDescriptor = ArchDescriptor {
    name: "mipsel",
    endian: Endian::Little,
    ..MIPS_O32
};

pub static M68K: ArchDescriptor = ArchDescriptor {
    name: "m68k",
    bits: Bits::W32,
    endian: Endian::Big,
    sp: Reg::Sp,
    pc: Reg::Pc,
    syscall_num: Reg::D0,
    syscall_ret: Reg::D0,
    syscall_args: &[Reg::D1, Reg::D2, Reg::D3, Reg::D4, Reg::D5],
    stack_args_offset: None,
    error_flag: None,
    errnos: &[],
    // trap #0 is exception vector 32
    gate: SyscallGate::Interrupt(32),
    registers: &[
        Reg::D0,
        Reg::D1,
        Reg::D2,
        Reg::D3,
        Reg::D4,
        Reg::D5,
        Reg::Sp,
        Reg::Pc,
    ],
};
