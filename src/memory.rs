use std::ops::Range;

use crate::backend::MemError;

/// A single page-aligned backing allocation.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub start: u64,
    pub data: Vec<u8>,
}

impl Mapping {
    pub fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// Sparse emulated address space made of non-overlapping mappings.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    page_size: u64,
    mappings: Vec<Mapping>,
}

impl AddressSpace {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            mappings: Vec::new(),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn ranges(&self) -> Vec<Range<u64>> {
        self.mappings.iter().map(|m| m.start..m.end()).collect()
    }

    /// Add a zero-filled mapping. Rejects unaligned or overlapping requests.
    pub fn map(&mut self, addr: u64, size: u64) -> Result<(), MemError> {
        if size == 0 || addr % self.page_size != 0 || size % self.page_size != 0 {
            return Err(MemError::Unaligned { addr, size });
        }
        let end = addr
            .checked_add(size)
            .ok_or(MemError::AddressOverflow { addr, size })?;

        if self
            .mappings
            .iter()
            .any(|m| addr < m.end() && m.start < end)
        {
            return Err(MemError::Overlap { addr, size });
        }

        let len = usize::try_from(size).map_err(|_| MemError::AddressOverflow { addr, size })?;
        self.mappings.push(Mapping {
            start: addr,
            data: vec![0u8; len],
        });
        self.mappings.sort_by_key(|m| m.start);
        Ok(())
    }

    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError> {
        let size = buf.len() as u64;
        addr.checked_add(size)
            .ok_or(MemError::AddressOverflow { addr, size })?;

        // Walk contiguous mappings so reads may straddle a mapping boundary.
        let mut done = 0usize;
        while done < buf.len() {
            let cur = addr + done as u64;
            let mapping = self
                .mapping_containing(cur)
                .ok_or(MemError::Unmapped { addr, size })?;
            let offset = (cur - mapping.start) as usize;
            let n = (mapping.data.len() - offset).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&mapping.data[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemError> {
        let size = data.len() as u64;
        addr.checked_add(size)
            .ok_or(MemError::AddressOverflow { addr, size })?;

        // Check the whole range first so a failed write leaves memory intact.
        if !self.covers_range(addr, size) {
            return Err(MemError::Unmapped { addr, size });
        }

        let mut done = 0usize;
        while done < data.len() {
            let cur = addr + done as u64;
            let mapping = self
                .mapping_containing_mut(cur)
                .ok_or(MemError::Unmapped { addr, size })?;
            let offset = (cur - mapping.start) as usize;
            let n = (mapping.data.len() - offset).min(data.len() - done);
            mapping.data[offset..offset + n].copy_from_slice(&data[done..done + n]);
            done += n;
        }
        Ok(())
    }

    /// Return true if mappings cover every byte of the given range.
    pub fn covers_range(&self, addr: u64, size: u64) -> bool {
        let Some(end) = addr.checked_add(size) else {
            return false;
        };
        let mut cur = addr;
        while cur < end {
            match self.mapping_containing(cur) {
                Some(m) => cur = m.end(),
                None => return false,
            }
        }
        true
    }

    fn mapping_containing(&self, addr: u64) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.contains(addr))
    }

    fn mapping_containing_mut(&mut self, addr: u64) -> Option<&mut Mapping> {
        self.mappings.iter_mut().find(|m| m.contains(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_rejects_overlap_and_misalignment() {
        let mut space = AddressSpace::new(0x1000);
        space.map(0x1000, 0x2000).unwrap();

        assert_eq!(
            space.map(0x2000, 0x1000),
            Err(MemError::Overlap {
                addr: 0x2000,
                size: 0x1000
            })
        );
        assert_eq!(
            space.map(0x4010, 0x1000),
            Err(MemError::Unaligned {
                addr: 0x4010,
                size: 0x1000
            })
        );
        assert!(space.map(0x3000, 0x1000).is_ok());
        assert_eq!(space.ranges(), vec![0x1000..0x3000, 0x3000..0x4000]);
    }

    #[test]
    fn reads_and_writes_straddle_adjacent_mappings() {
        let mut space = AddressSpace::new(0x1000);
        space.map(0x1000, 0x1000).unwrap();
        space.map(0x2000, 0x1000).unwrap();

        space.write(0x1ffe, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        space.read(0x1ffe, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn write_past_end_leaves_memory_untouched() {
        let mut space = AddressSpace::new(0x1000);
        space.map(0x1000, 0x1000).unwrap();

        let err = space.write(0x1ffe, &[9, 9, 9, 9]).unwrap_err();
        assert_eq!(
            err,
            MemError::Unmapped {
                addr: 0x1ffe,
                size: 4
            }
        );

        let mut buf = [0xffu8; 2];
        space.read(0x1ffe, &mut buf).unwrap();
        assert_eq!(buf, [0, 0]);
    }
}
