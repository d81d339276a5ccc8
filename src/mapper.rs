//! Turns loadable segments into page-aligned backend mappings.

use log::{debug, info};

use crate::{
    backend::{Backend, align_down, align_up},
    error::MapError,
    loader::Segment,
};

/// A page-aligned, backend-mapped range (`end` exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRegion {
    pub start: u64,
    pub end: u64,
}

impl MappedRegion {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &MappedRegion) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Align `[addr, addr + size)` to `page` boundaries. Outward rounding grows
/// the span to whole pages, inward rounding shrinks it. Returns `(start, size)`,
/// or `None` if the rounded span does not fit in the address space.
///
/// An outward span never comes back empty: a zero-length input still covers
/// the page holding `addr`.
pub fn align(addr: u64, size: u64, page: u64, round_outward: bool) -> Option<(u64, u64)> {
    let end = addr.checked_add(size)?;
    if round_outward {
        let start = align_down(addr, page);
        let end = end
            .checked_next_multiple_of(page)?
            .max(start.checked_add(page)?);
        Some((start, end - start))
    } else {
        let start = addr.checked_next_multiple_of(page)?;
        let end = align_down(end, page);
        Some((start, end.saturating_sub(start)))
    }
}

/// Compute the regions covering `segments`.
///
/// Every segment is widened to whole pages, then overlapping spans are merged
/// transitively, so the result does not depend on segment order.
pub fn plan_regions(segments: &[Segment], page: u64) -> Result<Vec<MappedRegion>, MapError> {
    let mut spans = segments
        .iter()
        .map(|seg| {
            let len = seg.data.len() as u64;
            let (start, size) = align(seg.addr, len, page, true).ok_or(MapError::Overflow {
                addr: seg.addr,
                len: seg.data.len(),
            })?;
            Ok(MappedRegion {
                start,
                end: start + size,
            })
        })
        .collect::<Result<Vec<_>, MapError>>()?;
    spans.sort_by_key(|r| r.start);

    let mut merged: Vec<MappedRegion> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if last.overlaps(&span) => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    Ok(merged)
}

/// Map every region, then copy each segment's bytes to its original address.
///
/// Writes happen only after all regions exist because a segment may land in
/// a region created for a different segment. The first failure aborts; regions
/// mapped before it stay mapped.
pub fn map_segments(
    backend: &mut dyn Backend,
    segments: &[Segment],
) -> Result<Vec<MappedRegion>, MapError> {
    let regions = plan_regions(segments, backend.page_size())?;

    for region in &regions {
        debug!("mapping {:#x}..{:#x}", region.start, region.end);
        backend
            .mem_map(region.start, region.size())
            .map_err(|source| MapError::Region {
                start: region.start,
                end: region.end,
                source,
            })?;
    }

    for seg in segments {
        backend
            .mem_write(seg.addr, &seg.data)
            .map_err(|source| MapError::Write {
                addr: seg.addr,
                len: seg.data.len(),
                source,
            })?;
    }

    info!(
        "mapped {} segments into {} regions",
        segments.len(),
        regions.len()
    );
    Ok(regions)
}
