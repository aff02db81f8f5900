// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::HashMap;
use min_max_heap::MinMaxHeap;
use std::collections::VecDeque;

/// NAND page size of the cold tier
pub const NAND_PAGE_SIZE: u64 = 4_096;

/// NAND erase-block size of the cold tier
pub const NAND_BLOCK_SIZE: u64 = 4 * 1_024 * 1_024;

/// GC starts once the free-block pool drops below this
const GC_TRIGGER_THRESHOLD: usize = 8;

/// Physical blocks beyond the logical capacity, in percent
const OVER_PROVISION_PCT: u64 = 7;

/// Logical / physical page number
type Lpn = u64;
type Ppn = u64;
type NandBlockId = u32;

#[derive(Debug, Default)]
struct NandBlock {
    valid: Vec<bool>,
    valid_cnt: usize,
    write_ptr: usize,
    stream: i32,
}

/// Victim candidate; min-heap order by valid count, block id as tie-break
#[derive(Eq, PartialEq, Ord, PartialOrd)]
struct VictimEntry {
    valid_cnt: usize,
    block: NandBlockId,
}

/// Page-mapping FTL modeling the cold tier
///
/// Absorbs evictions from the log cache and runs its own greedy GC, so the
/// simulator can report end-to-end write amplification. Host and NAND page
/// counters are exposed separately; `nand >= host` always holds.
pub struct ColdTierFtl {
    pages_per_block: usize,

    blocks: Vec<NandBlock>,
    free: VecDeque<NandBlockId>,

    lpn_to_ppn: HashMap<Lpn, Ppn>,
    ppn_to_lpn: HashMap<Ppn, Lpn>,

    /// Per-stream active block for host writes
    active: HashMap<i32, NandBlockId>,

    /// Per-stream active block for GC migrations
    gc_active: HashMap<i32, NandBlockId>,

    /// Closed blocks; entries revalidate lazily on pop
    victims: MinMaxHeap<VictimEntry>,

    host_pages: u64,
    nand_pages: u64,
    trim_calls: u64,
    trimmed_pages: u64,
}

impl ColdTierFtl {
    /// Creates a cold tier with the given logical capacity.
    ///
    /// Physical space is the capacity plus a fixed over-provisioning share
    /// for GC headroom.
    ///
    /// # Errors
    ///
    /// Will return `Err(Config)` if the capacity is zero.
    pub fn new(capacity_bytes: u64) -> crate::Result<Self> {
        if capacity_bytes == 0 {
            return Err(crate::Error::Config(
                "cold tier capacity must be > 0".into(),
            ));
        }

        let logical_blocks = capacity_bytes.div_ceil(NAND_BLOCK_SIZE);
        let spare = (logical_blocks * OVER_PROVISION_PCT / 100)
            .max(GC_TRIGGER_THRESHOLD as u64 + 2);
        let total_blocks = logical_blocks + spare;

        // NOTE: Truncation is OK, page count per block is small
        #[allow(clippy::cast_possible_truncation)]
        let pages_per_block = (NAND_BLOCK_SIZE / NAND_PAGE_SIZE) as usize;

        log::debug!(
            "Cold tier: {total_blocks} blocks ({logical_blocks} logical + {spare} spare), {pages_per_block} pages each",
        );

        #[allow(clippy::cast_possible_truncation)]
        let blocks = (0..total_blocks)
            .map(|_| NandBlock {
                valid: vec![false; pages_per_block],
                ..NandBlock::default()
            })
            .collect::<Vec<_>>();

        #[allow(clippy::cast_possible_truncation)]
        let free = (0..total_blocks as NandBlockId).collect();

        Ok(Self {
            pages_per_block,
            blocks,
            free,
            lpn_to_ppn: HashMap::default(),
            ppn_to_lpn: HashMap::default(),
            active: HashMap::default(),
            gc_active: HashMap::default(),
            victims: MinMaxHeap::new(),
            host_pages: 0,
            nand_pages: 0,
            trim_calls: 0,
            trimmed_pages: 0,
        })
    }

    /// Writes `[lba, lba + size)`, page-granular, into the given stream.
    ///
    /// # Errors
    ///
    /// Will return `Err(ColdTierExhausted)` if GC cannot reclaim space.
    pub fn write(&mut self, lba: u64, size: u64, stream: i32) -> crate::Result<()> {
        if size == 0 {
            return Ok(());
        }

        let start_lpn = lba / NAND_PAGE_SIZE;
        let end_lpn = (lba + size - 1) / NAND_PAGE_SIZE;

        for lpn in start_lpn..=end_lpn {
            if let Some(old) = self.lpn_to_ppn.get(&lpn).copied() {
                self.invalidate_ppn(old)?;
            }

            let ppn = self.allocate_page(stream, false)?;
            self.lpn_to_ppn.insert(lpn, ppn);
            self.ppn_to_lpn.insert(ppn, lpn);

            self.host_pages += 1;
            self.nand_pages += 1;

            if self.free.len() < GC_TRIGGER_THRESHOLD {
                self.collect_garbage()?;
            }
        }

        Ok(())
    }

    /// Drops the mapping for `[lba, lba + size)`.
    pub fn trim(&mut self, lba: u64, size: u64) -> crate::Result<()> {
        self.trim_calls += 1;

        if size == 0 {
            return Ok(());
        }

        let start_lpn = lba / NAND_PAGE_SIZE;
        let end_lpn = (lba + size - 1) / NAND_PAGE_SIZE;

        for lpn in start_lpn..=end_lpn {
            if let Some(ppn) = self.lpn_to_ppn.remove(&lpn) {
                self.invalidate_ppn(ppn)?;
                self.trimmed_pages += 1;
            }
        }

        Ok(())
    }

    fn invalidate_ppn(&mut self, ppn: Ppn) -> crate::Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        let block_id = (ppn / self.pages_per_block as u64) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let page_idx = (ppn % self.pages_per_block as u64) as usize;

        let block = self
            .blocks
            .get_mut(block_id)
            .ok_or(crate::Error::InvariantViolation {
                what: "ppn beyond cold tier",
                segment: None,
            })?;

        #[allow(clippy::indexing_slicing)]
        {
            if !block.valid[page_idx] || block.valid_cnt == 0 {
                return Err(crate::Error::InvariantViolation {
                    what: "cold page invalidated twice",
                    segment: None,
                });
            }
            block.valid[page_idx] = false;
        }
        block.valid_cnt -= 1;

        self.ppn_to_lpn.remove(&ppn);
        Ok(())
    }

    fn allocate_page(&mut self, stream: i32, gc: bool) -> crate::Result<Ppn> {
        let block_id = self.active_block(stream, gc)?;

        #[allow(clippy::indexing_slicing)]
        let block = &mut self.blocks[block_id as usize];

        let idx = block.write_ptr;
        block.write_ptr += 1;

        #[allow(clippy::indexing_slicing)]
        {
            block.valid[idx] = true;
        }
        block.valid_cnt += 1;

        Ok(u64::from(block_id) * self.pages_per_block as u64 + idx as u64)
    }

    fn active_block(&mut self, stream: i32, gc: bool) -> crate::Result<NandBlockId> {
        let table = if gc { &self.gc_active } else { &self.active };

        if let Some(&id) = table.get(&stream) {
            #[allow(clippy::indexing_slicing)]
            let block = &self.blocks[id as usize];

            if block.write_ptr < self.pages_per_block {
                return Ok(id);
            }

            // block is full; close it and register as a GC candidate
            self.victims.push(VictimEntry {
                valid_cnt: block.valid_cnt,
                block: id,
            });

            if gc {
                self.gc_active.remove(&stream);
            } else {
                self.active.remove(&stream);
            }
        }

        let id = self.free.pop_front().ok_or(crate::Error::ColdTierExhausted)?;

        #[allow(clippy::indexing_slicing)]
        {
            self.blocks[id as usize].stream = stream;
        }

        if gc {
            self.gc_active.insert(stream, id);
        } else {
            self.active.insert(stream, id);
        }

        Ok(id)
    }

    fn collect_garbage(&mut self) -> crate::Result<()> {
        while self.free.len() < GC_TRIGGER_THRESHOLD {
            let Some(victim) = self.pop_victim() else {
                // nothing closed yet; let writes continue into the reserve
                log::trace!("Cold-tier GC: no closed blocks to collect");
                return Ok(());
            };

            #[allow(clippy::indexing_slicing)]
            let (valid_cnt, stream) = {
                let b = &self.blocks[victim as usize];
                (b.valid_cnt, b.stream)
            };

            if valid_cnt == self.pages_per_block {
                // fully valid victim: erasing gains nothing, and copying
                // forever would spin
                log::error!("Cold-tier GC made no progress; upstream TRIM required");
                return Err(crate::Error::ColdTierExhausted);
            }

            self.migrate_live_pages(victim, stream)?;

            #[allow(clippy::indexing_slicing)]
            {
                let b = &mut self.blocks[victim as usize];
                b.valid.iter_mut().for_each(|v| *v = false);
                b.valid_cnt = 0;
                b.write_ptr = 0;
            }
            self.free.push_back(victim);
        }

        Ok(())
    }

    /// Pops the block with the fewest valid pages, skipping stale entries.
    fn pop_victim(&mut self) -> Option<NandBlockId> {
        while let Some(entry) = self.victims.pop_min() {
            #[allow(clippy::indexing_slicing)]
            let current = self.blocks[entry.block as usize].valid_cnt;

            if current == entry.valid_cnt {
                return Some(entry.block);
            }

            // count drifted since close; re-key and retry
            self.victims.push(VictimEntry {
                valid_cnt: current,
                block: entry.block,
            });
        }
        None
    }

    fn migrate_live_pages(&mut self, victim: NandBlockId, stream: i32) -> crate::Result<()> {
        for idx in 0..self.pages_per_block {
            #[allow(clippy::indexing_slicing)]
            let live = self.blocks[victim as usize].valid[idx];
            if !live {
                continue;
            }

            let old_ppn = u64::from(victim) * self.pages_per_block as u64 + idx as u64;
            let lpn = self
                .ppn_to_lpn
                .remove(&old_ppn)
                .ok_or(crate::Error::InvariantViolation {
                    what: "live cold page without reverse mapping",
                    segment: None,
                })?;

            let new_ppn = self.allocate_page(stream, true)?;
            self.lpn_to_ppn.insert(lpn, new_ppn);
            self.ppn_to_lpn.insert(new_ppn, lpn);

            // migration is NAND traffic, not host traffic
            self.nand_pages += 1;
        }

        Ok(())
    }

    /// Pages written on behalf of the host.
    #[must_use]
    pub fn host_pages(&self) -> u64 {
        self.host_pages
    }

    /// Pages physically written, including GC migrations.
    #[must_use]
    pub fn nand_pages(&self) -> u64 {
        self.nand_pages
    }

    /// Host traffic in bytes.
    #[must_use]
    pub fn host_bytes(&self) -> u64 {
        self.host_pages * NAND_PAGE_SIZE
    }

    /// NAND traffic in bytes.
    #[must_use]
    pub fn nand_bytes(&self) -> u64 {
        self.nand_pages * NAND_PAGE_SIZE
    }

    /// Amount of `trim` calls served.
    #[must_use]
    pub fn trim_calls(&self) -> u64 {
        self.trim_calls
    }

    /// Amount of mapped pages dropped by TRIM.
    #[must_use]
    pub fn trimmed_pages(&self) -> u64 {
        self.trimmed_pages
    }

    /// Cold-tier write amplification (`nand / host`), 1.0 when idle.
    // NOTE: Precision is not important here
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn waf(&self) -> f64 {
        if self.host_pages == 0 {
            return 1.0;
        }
        self.nand_pages as f64 / self.host_pages as f64
    }
}
