use std::{fs, ops::Range, path::Path};

use goblin::{
    Object,
    elf::{Elf, header::EI_OSABI, program_header},
};

use crate::{
    arch::{Bits, Endian},
    error::LoadError,
    os,
    symbols::{Symbol, SymbolTable},
};

/// Largest `p_memsz` materialized for one segment.
const MAX_SEGMENT_SIZE: u64 = 1 << 30;

/// What the executable says about the machine it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub machine: u16,
    pub bits: Bits,
    pub endian: Endian,
    pub os_abi: u8,
}

/// Bytes to materialize at `addr` before execution starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub addr: u64,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct Executable {
    pub entry: u64,
    pub target: Target,
    pub segments: Vec<Segment>,
    /// Address range of `.data`, for diagnostics.
    pub data_segment: Option<Range<u64>>,
    pub symbols: SymbolTable,
}

impl Executable {
    pub fn symbolicate(&self, addr: u64) -> String {
        self.symbols.symbolicate(addr)
    }
}

pub fn load_file(path: &Path) -> Result<Executable, LoadError> {
    let data = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_bytes(&data)
}

pub fn load_bytes(data: &[u8]) -> Result<Executable, LoadError> {
    match Object::parse(data)? {
        Object::Elf(elf) => load_elf(&elf, data),
        Object::PE(_) => Err(LoadError::UnsupportedFormat("PE".into())),
        Object::Mach(_) => Err(LoadError::UnsupportedFormat("Mach-O".into())),
        Object::Archive(_) => Err(LoadError::UnsupportedFormat("archive".into())),
        _ => Err(LoadError::UnsupportedFormat("unknown".into())),
    }
}

fn load_elf(elf: &Elf, file_bytes: &[u8]) -> Result<Executable, LoadError> {
    let target = Target {
        machine: elf.header.e_machine,
        bits: if elf.is_64 { Bits::W64 } else { Bits::W32 },
        endian: if elf.little_endian {
            Endian::Little
        } else {
            Endian::Big
        },
        os_abi: elf.header.e_ident[EI_OSABI],
    };
    // nothing is materialized for a target we cannot run
    let (arch, _) = os::resolve(&target)?;

    Ok(Executable {
        entry: elf.entry,
        target,
        segments: load_segments(elf, file_bytes, arch.address_limit())?,
        data_segment: data_segment(elf),
        symbols: symbols(elf),
    })
}

/// One [`Segment`] per `PT_LOAD` header, in header order, holding the file
/// bytes followed by zero fill up to `p_memsz`. Every segment must end at or
/// below `limit`.
fn load_segments(elf: &Elf, file_bytes: &[u8], limit: u64) -> Result<Vec<Segment>, LoadError> {
    let mut segments = Vec::new();

    for ph in &elf.program_headers {
        if ph.p_type != program_header::PT_LOAD {
            continue;
        }

        if ph.p_memsz < ph.p_filesz {
            return Err(LoadError::Malformed(format!(
                "segment memsz ({:#x}) smaller than filesz ({:#x}) at vaddr {:#x}",
                ph.p_memsz, ph.p_filesz, ph.p_vaddr
            )));
        }

        if ph.p_memsz > MAX_SEGMENT_SIZE {
            return Err(LoadError::Malformed(format!(
                "segment at {:#x} is too large ({:#x} bytes)",
                ph.p_vaddr, ph.p_memsz
            )));
        }
        let offset = ph.p_offset as usize;
        let file_size = ph.p_filesz as usize;
        let mem_size = ph.p_memsz as usize;

        if offset
            .checked_add(file_size)
            .is_none_or(|end| end > file_bytes.len())
        {
            return Err(LoadError::Malformed(format!(
                "segment at offset {:#x} with size {:#x} exceeds file ({} bytes)",
                ph.p_offset,
                ph.p_filesz,
                file_bytes.len()
            )));
        }

        if ph
            .p_vaddr
            .checked_add(ph.p_memsz)
            .is_none_or(|end| end > limit)
        {
            return Err(LoadError::Malformed(format!(
                "segment at {:#x} ({:#x} bytes) ends beyond {limit:#x}",
                ph.p_vaddr, ph.p_memsz
            )));
        }

        let mut data = vec![0u8; mem_size];
        data[..file_size].copy_from_slice(&file_bytes[offset..offset + file_size]);

        segments.push(Segment {
            addr: ph.p_vaddr,
            data,
        });
    }

    if segments.is_empty() {
        return Err(LoadError::Malformed("no loadable segments".into()));
    }
    Ok(segments)
}

fn data_segment(elf: &Elf) -> Option<Range<u64>> {
    elf.section_headers
        .iter()
        .find(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(".data"))
        .and_then(|sh| Some(sh.sh_addr..sh.sh_addr.checked_add(sh.sh_size)?))
}

fn symbols(elf: &Elf) -> SymbolTable {
    elf.syms
        .iter()
        .filter_map(|sym| {
            let name = elf.strtab.get_at(sym.st_name)?;
            if name.is_empty() {
                return None;
            }
            Some(Symbol {
                name: name.to_string(),
                value: sym.st_value,
                size: sym.st_size,
            })
        })
        .collect()
}
