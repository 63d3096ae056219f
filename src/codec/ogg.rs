//! Ogg page framing for Opus byte streams.
//!
//! The writer emits one Opus packet per page with OpusHead/OpusTags
//! header pages up front, which keeps the persisted stream
//! self-delimiting. The demuxer is push-based: bytes may arrive in any
//! chunking and packets come out only once they are fully buffered.

use std::collections::VecDeque;

use crate::error::{Error, Result};

const CAPTURE_PATTERN: &[u8] = b"OggS";
const PAGE_HEADER_SIZE: usize = 27;
const HEADER_TYPE_CONTINUED: u8 = 0x01;
const HEADER_TYPE_BOS: u8 = 0x02;
const HEADER_TYPE_EOS: u8 = 0x04;

/// Vendor string written into OpusTags.
const VENDOR: &[u8] = b"opustream";

/// Writes Opus packets as Ogg pages for a single logical stream.
pub(crate) struct PageWriter {
    serial: u32,
    page_index: u32,
    granule: u64,
    checksum_table: [u32; 256],
}

impl PageWriter {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            page_index: 0,
            granule: 0,
            checksum_table: checksum_table(),
        }
    }

    /// Emits the OpusHead BOS page followed by the OpusTags page.
    ///
    /// Pre-skip is written as zero: this crate's reader does not trim
    /// decoder priming samples, and a zero pre-skip keeps round-trip
    /// lengths aligned with the encoded input.
    pub fn head_pages(&mut self, sample_rate: u32, channels: u8) -> Vec<u8> {
        let mut head = vec![0u8; 19];
        head[..8].copy_from_slice(b"OpusHead");
        head[8] = 1; // version
        head[9] = channels;
        head[10..12].copy_from_slice(&0u16.to_le_bytes()); // pre-skip
        head[12..16].copy_from_slice(&sample_rate.to_le_bytes());
        head[16..18].copy_from_slice(&0i16.to_le_bytes()); // output gain
        head[18] = 0; // channel mapping family

        let mut tags = vec![0u8; 8 + 4 + VENDOR.len() + 4];
        tags[..8].copy_from_slice(b"OpusTags");
        tags[8..12].copy_from_slice(&(VENDOR.len() as u32).to_le_bytes());
        tags[12..12 + VENDOR.len()].copy_from_slice(VENDOR);
        // trailing u32: zero user comments

        let mut out = self.page(&head, HEADER_TYPE_BOS, 0);
        out.extend_from_slice(&self.page(&tags, 0, 0));
        out
    }

    /// Emits one audio packet as a page, advancing the granule position
    /// by `granule_delta` (the frame length in 48 kHz samples).
    pub fn audio_page(&mut self, packet: &[u8], granule_delta: u64) -> Vec<u8> {
        self.granule += granule_delta;
        self.page(packet, 0, self.granule)
    }

    /// Emits the end-of-stream page.
    pub fn eos_page(&mut self) -> Vec<u8> {
        self.page(&[], HEADER_TYPE_EOS, self.granule)
    }

    fn page(&mut self, payload: &[u8], header_type: u8, granule: u64) -> Vec<u8> {
        let n_segments = if payload.is_empty() { 1 } else { payload.len() / 255 + 1 };
        let mut page = vec![0u8; PAGE_HEADER_SIZE + n_segments + payload.len()];

        page[..4].copy_from_slice(CAPTURE_PATTERN);
        page[4] = 0; // version
        page[5] = header_type;
        page[6..14].copy_from_slice(&granule.to_le_bytes());
        page[14..18].copy_from_slice(&self.serial.to_le_bytes());
        page[18..22].copy_from_slice(&self.page_index.to_le_bytes());
        // page[22..26] is the checksum, filled in below
        page[26] = n_segments as u8;

        // Lacing: chains of 255 terminated by the remainder.
        for i in 0..n_segments - 1 {
            page[PAGE_HEADER_SIZE + i] = 255;
        }
        page[PAGE_HEADER_SIZE + n_segments - 1] = (payload.len() % 255) as u8;
        page[PAGE_HEADER_SIZE + n_segments..].copy_from_slice(payload);

        let mut checksum = 0u32;
        for &b in &page {
            checksum =
                (checksum << 8) ^ self.checksum_table[((checksum >> 24) as u8 ^ b) as usize];
        }
        page[22..26].copy_from_slice(&checksum.to_le_bytes());

        self.page_index += 1;
        page
    }
}

/// Ogg CRC32 lookup table (polynomial 0x04c11db7, no reflection).
fn checksum_table() -> [u32; 256] {
    const POLY: u32 = 0x04c11db7;
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut r = (i as u32) << 24;
        for _ in 0..8 {
            r = if r & 0x8000_0000 != 0 { (r << 1) ^ POLY } else { r << 1 };
        }
        *entry = r;
    }
    table
}

/// Incremental Ogg packet demuxer.
///
/// Buffers pushed bytes until a whole page is available, then splits it
/// into packets along the lacing table. Packets continued across pages
/// are reassembled. A buffer head that is not an Ogg capture pattern is
/// an unrecoverable desync.
#[derive(Default)]
pub(crate) struct Demuxer {
    buf: Vec<u8>,
    pending: VecDeque<Vec<u8>>,
    partial: Vec<u8>,
}

impl Demuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes; no parsing happens here.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete packet, or `None` when more bytes are
    /// needed.
    pub fn next_packet(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(packet) = self.pending.pop_front() {
                return Ok(Some(packet));
            }
            if !self.parse_page()? {
                return Ok(None);
            }
        }
    }

    /// Parses one page off the front of the buffer if fully present.
    fn parse_page(&mut self) -> Result<bool> {
        if self.buf.len() < PAGE_HEADER_SIZE {
            return Ok(false);
        }
        if &self.buf[..4] != CAPTURE_PATTERN {
            return Err(Error::Desync("bad ogg capture pattern"));
        }
        let n_segments = self.buf[26] as usize;
        if self.buf.len() < PAGE_HEADER_SIZE + n_segments {
            return Ok(false);
        }
        let body: usize = self.buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + n_segments]
            .iter()
            .map(|&lace| lace as usize)
            .sum();
        let total = PAGE_HEADER_SIZE + n_segments + body;
        if self.buf.len() < total {
            return Ok(false);
        }

        let page: Vec<u8> = self.buf.drain(..total).collect();
        let continued = page[5] & HEADER_TYPE_CONTINUED != 0;
        if !continued && !self.partial.is_empty() {
            // A packet was left open by the previous page but this one
            // does not continue it; drop the orphaned prefix.
            self.partial.clear();
        }

        let mut pos = PAGE_HEADER_SIZE + n_segments;
        for &lace in &page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + n_segments] {
            self.partial.extend_from_slice(&page[pos..pos + lace as usize]);
            pos += lace as usize;
            if lace < 255 {
                self.pending.push_back(std::mem::take(&mut self.partial));
            }
        }
        Ok(true)
    }

    /// Number of buffered bytes not yet parsed into packets.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Identification header of an Opus stream (RFC 7845 §5.1).
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpusHead {
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
}

impl OpusHead {
    pub fn is_head(packet: &[u8]) -> bool {
        packet.len() >= 8 && &packet[..8] == b"OpusHead"
    }

    pub fn is_tags(packet: &[u8]) -> bool {
        packet.len() >= 8 && &packet[..8] == b"OpusTags"
    }

    pub fn parse(packet: &[u8]) -> Result<Self> {
        if !Self::is_head(packet) {
            return Err(Error::BadHeader("missing OpusHead magic"));
        }
        if packet.len() < 19 {
            return Err(Error::BadHeader("OpusHead packet too short"));
        }
        Ok(Self {
            channels: packet[9],
            pre_skip: u16::from_le_bytes([packet[10], packet[11]]),
            input_sample_rate: u32::from_le_bytes([
                packet[12], packet[13], packet[14], packet[15],
            ]),
        })
    }
}
