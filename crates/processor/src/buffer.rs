//! Fixed-size, reference-counted result buffers
//!
//! A [`BufferPool`] owns an arena of equally sized byte regions. Acquiring a
//! region yields a [`BufferHandle`]; cloning the handle retains the region and
//! dropping the last handle returns it to the free list. Window results are
//! bincode-encoded into regions as length-prefixed rows.

use crate::error::{BufferError, BufferResult, ProcessorError, Result};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use slicestream_types::WindowResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

const LEN_PREFIX: usize = std::mem::size_of::<u32>();

#[derive(Debug)]
struct Region {
    refs: AtomicUsize,
    data: Mutex<Vec<u8>>,
}

#[derive(Debug)]
struct PoolInner {
    region_size: usize,
    regions: Box<[Region]>,
    free: ArrayQueue<usize>,
}

/// Arena of fixed-size byte regions
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool of `regions` regions of `region_size` bytes each
    pub fn new(region_size: usize, regions: usize) -> Self {
        let regions = regions.max(1);
        let free = ArrayQueue::new(regions);
        for index in 0..regions {
            // The queue has exactly `regions` slots
            let _ = free.push(index);
        }
        let arena = (0..regions)
            .map(|_| Region {
                refs: AtomicUsize::new(0),
                data: Mutex::new(Vec::with_capacity(region_size)),
            })
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                region_size,
                regions: arena,
                free,
            }),
        }
    }

    /// Acquire a free region
    pub fn acquire(&self) -> BufferResult<BufferHandle> {
        let region = self.inner.free.pop().ok_or(BufferError::PoolExhausted {
            regions: self.inner.regions.len(),
        })?;
        self.inner.regions[region].refs.store(1, Ordering::Release);
        trace!(region, "acquired buffer region");
        Ok(BufferHandle {
            pool: self.inner.clone(),
            region,
        })
    }

    pub fn region_size(&self) -> usize {
        self.inner.region_size
    }

    /// Total number of regions
    pub fn capacity(&self) -> usize {
        self.inner.regions.len()
    }

    /// Number of regions currently free
    pub fn available(&self) -> usize {
        self.inner.free.len()
    }
}

/// Shared ownership of one pool region
#[derive(Debug)]
pub struct BufferHandle {
    pool: Arc<PoolInner>,
    region: usize,
}

impl BufferHandle {
    /// Index of the region within its pool
    pub fn region(&self) -> usize {
        self.region
    }

    /// Number of live handles to this region
    pub fn ref_count(&self) -> usize {
        self.slot().refs.load(Ordering::Acquire)
    }

    /// Bytes currently stored
    pub fn len(&self) -> usize {
        self.slot().data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free space in bytes
    pub fn remaining(&self) -> usize {
        self.pool.region_size - self.len()
    }

    /// Append bytes to the region
    pub fn append(&self, bytes: &[u8]) -> BufferResult<()> {
        let mut data = self.slot().data.lock();
        if data.len() + bytes.len() > self.pool.region_size {
            return Err(BufferError::RegionOverflow {
                required: data.len() + bytes.len(),
                capacity: self.pool.region_size,
            });
        }
        data.extend_from_slice(bytes);
        Ok(())
    }

    /// Copy of the stored bytes
    pub fn to_vec(&self) -> Vec<u8> {
        self.slot().data.lock().clone()
    }

    fn slot(&self) -> &Region {
        &self.pool.regions[self.region]
    }
}

impl Clone for BufferHandle {
    fn clone(&self) -> Self {
        self.slot().refs.fetch_add(1, Ordering::AcqRel);
        Self {
            pool: self.pool.clone(),
            region: self.region,
        }
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        if self.slot().refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.slot().data.lock().clear();
            // A released region always fits back into the free list
            let _ = self.pool.free.push(self.region);
            trace!(region = self.region, "released buffer region");
        }
    }
}

/// A region holding encoded window result rows
#[derive(Debug, Clone)]
pub struct ResultBuffer {
    handle: BufferHandle,
    rows: usize,
}

impl ResultBuffer {
    /// Number of rows stored
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn handle(&self) -> &BufferHandle {
        &self.handle
    }

    /// Decode all rows
    pub fn decode(&self) -> Result<Vec<WindowResult>> {
        let bytes = self.handle.to_vec();
        let mut rows = Vec::with_capacity(self.rows);
        let mut offset = 0;
        while offset < bytes.len() {
            let prefix = bytes
                .get(offset..offset + LEN_PREFIX)
                .ok_or_else(|| ProcessorError::Serialization("truncated row length".to_string()))?;
            let mut len = [0u8; LEN_PREFIX];
            len.copy_from_slice(prefix);
            let len = u32::from_le_bytes(len) as usize;
            offset += LEN_PREFIX;

            let row = bytes
                .get(offset..offset + len)
                .ok_or_else(|| ProcessorError::Serialization("truncated row".to_string()))?;
            rows.push(bincode::deserialize(row)?);
            offset += len;
        }
        Ok(rows)
    }
}

/// Encode rows into as few regions as possible
///
/// Fails with `RegionOverflow` if a single row does not fit into an empty
/// region, and with `PoolExhausted` if no region is free. Regions acquired
/// before a failure are released.
pub fn encode_results(pool: &BufferPool, results: &[WindowResult]) -> Result<Vec<ResultBuffer>> {
    let mut buffers = Vec::new();
    let mut current: Option<ResultBuffer> = None;

    for result in results {
        let row = bincode::serialize(result)?;
        let required = row.len() + LEN_PREFIX;
        if required > pool.region_size() {
            return Err(BufferError::RegionOverflow {
                required,
                capacity: pool.region_size(),
            }
            .into());
        }

        let fits = matches!(&current, Some(buffer) if buffer.handle.remaining() >= required);
        if !fits {
            if let Some(full) = current.take() {
                buffers.push(full);
            }
            current = Some(ResultBuffer {
                handle: pool.acquire()?,
                rows: 0,
            });
        }

        if let Some(buffer) = current.as_mut() {
            buffer.handle.append(&(row.len() as u32).to_le_bytes())?;
            buffer.handle.append(&row)?;
            buffer.rows += 1;
        }
    }

    buffers.extend(current);
    Ok(buffers)
}
