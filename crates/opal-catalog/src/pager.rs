//! Paged row file.
//!
//! The pager stores variable-length row payloads in fixed-size pages.
//! A payload that exceeds one page spills into a chain of overflow pages;
//! the chain head's page number is the row id handed back to callers and
//! recorded in indexes. Deleted pages go on a free list and are reused by
//! later writes, so row ids are stable but not monotonic.
//!
//! All primitive operations serialize through one internal mutex; the pager
//! is safe to share across threads.
//!
//! # Page Layout
//!
//! ```text
//! ┌───────┬─────────────┬──────────────┬──────────────────────┐
//! │ flags │ payload len │ overflow link│ payload...           │
//! │  1 B  │   4 B LE    │    8 B LE    │  PAGE_PAYLOAD_SIZE   │
//! └───────┴─────────────┴──────────────┴──────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use opal_common::error::{OpalError, OpalResult};
use opal_common::{PAGE_HEADER_SIZE, PAGE_PAYLOAD_SIZE, PAGE_SIZE};

/// Page holds live row data and starts a chain.
const FLAG_USED: u8 = 0b0001;
/// Page is free and may be reused.
const FLAG_DELETED: u8 = 0b0010;
/// Page continues a chain started elsewhere; not addressable as a row.
const FLAG_OVERFLOW: u8 = 0b0100;

/// Sentinel for "no overflow link".
const NO_LINK: u64 = u64::MAX;

/// Append-overwrite-delete paged file.
pub struct Pager {
    path: PathBuf,
    inner: Mutex<PagerInner>,
}

struct PagerInner {
    file: File,
    page_count: u64,
    free: BTreeSet<u64>,
}

struct PageHeader {
    flags: u8,
    len: u32,
    next: u64,
}

impl Pager {
    /// Opens (creating if absent) a paged file and rebuilds the free list
    /// from page headers.
    pub fn open(path: impl AsRef<Path>) -> OpalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        let page_count = len / PAGE_SIZE as u64;

        let mut free = BTreeSet::new();
        for page in 0..page_count {
            let header = read_header(&mut file, page)?;
            if header.flags & FLAG_DELETED != 0 {
                free.insert(page);
            }
        }

        Ok(Self {
            path,
            inner: Mutex::new(PagerInner {
                file,
                page_count,
                free,
            }),
        })
    }

    /// Returns the file path backing this pager.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a payload, chaining overflow pages as needed, and returns the
    /// stable row id of the chain head.
    pub fn write(&self, data: &[u8]) -> OpalResult<u64> {
        let mut inner = self.inner.lock();
        let pages = allocate(&mut inner, chunk_count(data));
        write_chain(&mut inner, &pages, data)?;
        Ok(pages[0])
    }

    /// Overwrites the payload at `row_id` in place, growing or shrinking the
    /// overflow chain as needed.
    pub fn write_to(&self, row_id: u64, data: &[u8]) -> OpalResult<()> {
        let mut inner = self.inner.lock();
        let mut pages = chain_pages(&mut inner, row_id)?;

        let needed = chunk_count(data);
        if pages.len() > needed {
            for &page in &pages[needed..] {
                write_page(&mut inner.file, page, FLAG_DELETED, &[], NO_LINK)?;
                inner.free.insert(page);
            }
            pages.truncate(needed);
        } else if pages.len() < needed {
            let extra = allocate(&mut inner, needed - pages.len());
            pages.extend(extra);
        }

        write_chain(&mut inner, &pages, data)
    }

    /// Reads the payload stored at `row_id`.
    pub fn get_page(&self, row_id: u64) -> OpalResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        let pages = chain_pages(&mut inner, row_id)?;

        let mut out = Vec::new();
        for &page in &pages {
            let header = read_header(&mut inner.file, page)?;
            let mut chunk = vec![0u8; header.len as usize];
            inner
                .file
                .seek(SeekFrom::Start(page * PAGE_SIZE as u64 + PAGE_HEADER_SIZE as u64))?;
            inner.file.read_exact(&mut chunk)?;
            out.extend_from_slice(&chunk);
        }

        Ok(out)
    }

    /// Marks the chain at `row_id` free. The id remains visible to scans
    /// until reused and must be filtered via [`Pager::deleted_pages`].
    pub fn delete_page(&self, row_id: u64) -> OpalResult<()> {
        let mut inner = self.inner.lock();
        let pages = chain_pages(&mut inner, row_id)?;

        for &page in &pages {
            write_page(&mut inner.file, page, FLAG_DELETED, &[], NO_LINK)?;
            inner.free.insert(page);
        }

        Ok(())
    }

    /// Returns the ordered ids of all free pages.
    pub fn deleted_pages(&self) -> Vec<u64> {
        self.inner.lock().free.iter().copied().collect()
    }

    /// Total number of pages in the file, including deleted and overflow
    /// pages. This bounds row ids but is not a row count.
    pub fn count(&self) -> u64 {
        self.inner.lock().page_count
    }

    /// Flushes the file to disk.
    pub fn close(&self) -> OpalResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

/// Number of pages a payload occupies. Empty payloads still take one page.
fn chunk_count(data: &[u8]) -> usize {
    data.len().div_ceil(PAGE_PAYLOAD_SIZE).max(1)
}

/// Takes `n` page ids from the free list, appending fresh pages when the
/// free list runs dry.
fn allocate(inner: &mut PagerInner, n: usize) -> Vec<u64> {
    let mut pages = Vec::with_capacity(n);
    for _ in 0..n {
        if let Some(page) = inner.free.pop_first() {
            pages.push(page);
        } else {
            pages.push(inner.page_count);
            inner.page_count += 1;
        }
    }
    pages
}

/// Walks the chain starting at `row_id`, validating that it is a live head.
fn chain_pages(inner: &mut PagerInner, row_id: u64) -> OpalResult<Vec<u64>> {
    if row_id >= inner.page_count {
        return Err(OpalError::corruption(
            "page",
            format!("row id {row_id} out of range"),
        ));
    }

    let header = read_header(&mut inner.file, row_id)?;
    if header.flags & FLAG_DELETED != 0 {
        return Err(OpalError::corruption(
            "page",
            format!("row id {row_id} is deleted"),
        ));
    }
    if header.flags & FLAG_OVERFLOW != 0 {
        return Err(OpalError::corruption(
            "page",
            format!("row id {row_id} is an overflow page"),
        ));
    }

    let mut pages = vec![row_id];
    let mut next = header.next;
    while next != NO_LINK {
        if next >= inner.page_count || pages.contains(&next) {
            return Err(OpalError::corruption(
                "page",
                format!("broken overflow chain at page {next}"),
            ));
        }
        pages.push(next);
        next = read_header(&mut inner.file, next)?.next;
    }

    Ok(pages)
}

/// Writes `data` across `pages`, linking them into a chain.
fn write_chain(inner: &mut PagerInner, pages: &[u64], data: &[u8]) -> OpalResult<()> {
    let mut chunks: Vec<&[u8]> = data.chunks(PAGE_PAYLOAD_SIZE).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    for (i, (&page, chunk)) in pages.iter().zip(chunks.iter()).enumerate() {
        let flags = if i == 0 {
            FLAG_USED
        } else {
            FLAG_USED | FLAG_OVERFLOW
        };
        let next = pages.get(i + 1).copied().unwrap_or(NO_LINK);
        write_page(&mut inner.file, page, flags, chunk, next)?;
    }

    Ok(())
}

fn read_header(file: &mut File, page: u64) -> OpalResult<PageHeader> {
    let mut buf = [0u8; PAGE_HEADER_SIZE];
    file.seek(SeekFrom::Start(page * PAGE_SIZE as u64))?;
    file.read_exact(&mut buf)?;

    Ok(PageHeader {
        flags: buf[0],
        len: u32::from_le_bytes(buf[1..5].try_into().expect("header slice")),
        next: u64::from_le_bytes(buf[5..13].try_into().expect("header slice")),
    })
}

fn write_page(file: &mut File, page: u64, flags: u8, payload: &[u8], next: u64) -> OpalResult<()> {
    let mut buf = vec![0u8; PAGE_SIZE];
    buf[0] = flags;
    buf[1..5].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    buf[5..13].copy_from_slice(&next.to_le_bytes());
    buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + payload.len()].copy_from_slice(payload);

    file.seek(SeekFrom::Start(page * PAGE_SIZE as u64))?;
    file.write_all(&buf)?;
    Ok(())
}
