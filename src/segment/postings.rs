//! Block-compressed postings with positions
//!
//! A posting list is a block count, one skip entry per block, then the
//! blocks. Each block holds up to [`BLOCK_SIZE`] documents:
//! - docno deltas, bitpacked (deltas run across blocks)
//! - term frequencies, bitpacked
//! - position deltas of every document in the block, bitpacked
//! - the block's max term frequency

use std::io;

use super::types::{DocNo, Posting, PostingBlock, PostingListMeta, BLOCK_SIZE};

/// Variable-byte encoding for integers
pub fn encode_vbyte(value: u32, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80);
            break;
        } else {
            output.push(byte);
        }
    }
}

/// Decode a variable-byte encoded integer
pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> io::Result<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;

    loop {
        let byte = *input.get(*pos).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of vbyte")
        })?;
        *pos += 1;

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 != 0 {
            return Ok(result);
        }

        shift += 7;
        if shift > 28 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "vbyte value too large",
            ));
        }
    }
}

/// Pack integers using the minimum bit width of the largest one
pub fn bitpack_encode(values: &[u32], output: &mut Vec<u8>) {
    let max_val = values.iter().copied().max().unwrap_or(0);
    if values.is_empty() {
        output.push(0);
        return;
    }
    let bits_needed = if max_val == 0 {
        1
    } else {
        32 - max_val.leading_zeros()
    } as u8;

    output.push(bits_needed);

    let mut current: u64 = 0;
    let mut bits_in_current = 0;

    for &value in values {
        current |= (value as u64) << bits_in_current;
        bits_in_current += bits_needed as u32;

        while bits_in_current >= 8 {
            output.push(current as u8);
            current >>= 8;
            bits_in_current -= 8;
        }
    }

    if bits_in_current > 0 {
        output.push(current as u8);
    }
}

/// Decode `count` bitpacked integers
pub fn bitpack_decode(input: &[u8], pos: &mut usize, count: usize) -> io::Result<Vec<u32>> {
    let bits_needed = *input.get(*pos).ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of bitpack")
    })? as u32;
    *pos += 1;

    if bits_needed == 0 {
        return Ok(vec![0; count]);
    }
    if bits_needed > 32 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "bitpack width out of range",
        ));
    }

    let total_bits = count as u64 * bits_needed as u64;
    let bytes_needed = ((total_bits + 7) / 8) as usize;
    if *pos + bytes_needed > input.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "not enough bytes for bitpack",
        ));
    }

    let mut values = Vec::with_capacity(count);
    let mut current: u64 = 0;
    let mut bits_available = 0;
    let mask = (1u64 << bits_needed) - 1;
    let end = *pos + bytes_needed;

    for _ in 0..count {
        while bits_available < bits_needed {
            if *pos < end {
                current |= (input[*pos] as u64) << bits_available;
                *pos += 1;
            }
            bits_available += 8;
        }

        values.push((current & mask) as u32);
        current >>= bits_needed;
        bits_available -= bits_needed;
    }
    *pos = end;

    Ok(values)
}

fn corrupt(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Skip data for one block
#[derive(Clone, Debug, Default)]
pub struct SkipEntry {
    /// Maximum docno in this block
    pub max_docno: DocNo,
    /// Offset of this block relative to the first block
    pub block_offset: u64,
    /// Maximum term frequency in this block
    pub max_tf: u32,
}

/// Writer for posting lists
pub struct PostingsWriter {
    block_data: Vec<u8>,
    skip_entries: Vec<SkipEntry>,
    current_block: PostingBlock,
    last_docno: Option<DocNo>,
    data: Vec<u8>,
}

impl PostingsWriter {
    pub fn new() -> Self {
        Self {
            block_data: Vec::new(),
            skip_entries: Vec::new(),
            current_block: PostingBlock::new(),
            last_docno: None,
            data: Vec::new(),
        }
    }

    /// Start writing a new posting list
    pub fn start_posting_list(&mut self) {
        self.block_data.clear();
        self.skip_entries.clear();
        self.current_block = PostingBlock::new();
        self.last_docno = None;
    }

    /// Add a posting; docnos must be strictly increasing within a list
    pub fn add_posting(&mut self, posting: Posting) -> io::Result<()> {
        if let Some(last) = self.last_docno {
            if posting.docno <= last {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("docno {} added after {}", posting.docno.0, last.0),
                ));
            }
        }
        if posting.positions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("positions of docno {} are not strictly increasing", posting.docno.0),
            ));
        }
        self.last_docno = Some(posting.docno);
        self.current_block.push(posting);

        if self.current_block.is_full() {
            self.flush_block();
        }
        Ok(())
    }

    /// Finish writing a posting list and return metadata
    pub fn finish_posting_list(&mut self, doc_frequency: u32, total_term_frequency: u64) -> PostingListMeta {
        if !self.current_block.is_empty() {
            self.flush_block();
        }

        let offset = self.data.len() as u64;

        encode_vbyte(self.skip_entries.len() as u32, &mut self.data);
        for skip in &self.skip_entries {
            encode_vbyte(skip.max_docno.0, &mut self.data);
            self.data.extend_from_slice(&skip.block_offset.to_le_bytes());
            encode_vbyte(skip.max_tf, &mut self.data);
        }
        self.data.extend_from_slice(&self.block_data);

        let length = self.data.len() as u64 - offset;

        PostingListMeta {
            offset,
            length,
            doc_frequency,
            total_term_frequency,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    fn flush_block(&mut self) {
        if self.current_block.is_empty() {
            return;
        }
        let block = std::mem::take(&mut self.current_block);
        let previous_max = self.skip_entries.last().map(|s| s.max_docno.0);

        self.skip_entries.push(SkipEntry {
            max_docno: block.max_docno,
            block_offset: self.block_data.len() as u64,
            max_tf: block.max_tf,
        });

        encode_vbyte(block.len() as u32, &mut self.block_data);

        let mut deltas = Vec::with_capacity(block.len());
        let mut prev = previous_max;
        for docno in &block.docnos {
            deltas.push(match prev {
                Some(p) => docno.0 - p,
                None => docno.0,
            });
            prev = Some(docno.0);
        }
        bitpack_encode(&deltas, &mut self.block_data);

        let tfs: Vec<u32> = block.positions.iter().map(|p| p.len() as u32).collect();
        bitpack_encode(&tfs, &mut self.block_data);

        let mut position_deltas = Vec::with_capacity(tfs.iter().sum::<u32>() as usize);
        for positions in &block.positions {
            let mut prev = 0u32;
            for (i, &p) in positions.iter().enumerate() {
                position_deltas.push(if i == 0 { p } else { p - prev });
                prev = p;
            }
        }
        bitpack_encode(&position_deltas, &mut self.block_data);

        self.block_data.extend_from_slice(&block.max_tf.to_le_bytes());
        self.current_block = PostingBlock::new();
    }
}

impl Default for PostingsWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader for posting lists
pub struct PostingsReader {
    data: Vec<u8>,
}

impl PostingsReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Iterator over the postings of one term
    pub fn get_postings(&self, meta: &PostingListMeta) -> io::Result<PostingIterator<'_>> {
        let start = meta.offset as usize;
        let end = meta
            .offset
            .checked_add(meta.length)
            .map(|e| e as usize)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| corrupt("posting list extends beyond data"))?;

        PostingIterator::new(&self.data[start..end])
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Iterator over the postings of one term
///
/// Corrupt data surfaces as an `Err` item, after which iteration stops.
pub struct PostingIterator<'a> {
    data: &'a [u8],
    blocks_start: usize,
    pos: usize,
    skip_entries: Vec<SkipEntry>,
    current_block_idx: usize,
    current_block: Vec<Posting>,
    block_pos: usize,
    last_docno: Option<u32>,
    failed: bool,
}

impl<'a> PostingIterator<'a> {
    pub fn new(data: &'a [u8]) -> io::Result<Self> {
        let mut pos = 0;
        let block_count = decode_vbyte(data, &mut pos)? as usize;

        let mut skip_entries = Vec::with_capacity(block_count.min(data.len()));
        for _ in 0..block_count {
            let max_docno = decode_vbyte(data, &mut pos)?;
            let bytes = data
                .get(pos..pos + 8)
                .ok_or_else(|| corrupt("truncated skip entry"))?;
            let mut offset = [0u8; 8];
            offset.copy_from_slice(bytes);
            pos += 8;
            let max_tf = decode_vbyte(data, &mut pos)?;
            skip_entries.push(SkipEntry {
                max_docno: DocNo(max_docno),
                block_offset: u64::from_le_bytes(offset),
                max_tf,
            });
        }

        Ok(Self {
            data,
            blocks_start: pos,
            pos,
            skip_entries,
            current_block_idx: 0,
            current_block: Vec::new(),
            block_pos: 0,
            last_docno: None,
            failed: false,
        })
    }

    /// Number of blocks in this list
    pub fn block_count(&self) -> usize {
        self.skip_entries.len()
    }

    /// Skip to the first posting with docno >= target
    pub fn skip_to(&mut self, target: DocNo) -> io::Result<Option<Posting>> {
        let buffered_past = self
            .current_block
            .last()
            .map(|p| p.docno >= target)
            .unwrap_or(false);
        if !buffered_past {
            let mut idx = self.current_block_idx;
            while idx < self.skip_entries.len() && self.skip_entries[idx].max_docno < target {
                idx += 1;
            }
            if idx != self.current_block_idx {
                if idx >= self.skip_entries.len() {
                    self.current_block_idx = idx;
                    self.current_block.clear();
                    self.block_pos = 0;
                    return Ok(None);
                }
                self.pos = self.blocks_start + self.skip_entries[idx].block_offset as usize;
                self.last_docno = Some(self.skip_entries[idx - 1].max_docno.0);
                self.current_block_idx = idx;
                self.current_block.clear();
                self.block_pos = 0;
            }
        }

        for posting in self.by_ref() {
            let posting = posting?;
            if posting.docno >= target {
                return Ok(Some(posting));
            }
        }
        Ok(None)
    }

    fn load_next_block(&mut self) -> io::Result<bool> {
        if self.current_block_idx >= self.skip_entries.len() {
            return Ok(false);
        }

        let count = decode_vbyte(self.data, &mut self.pos)? as usize;
        if count == 0 || count > BLOCK_SIZE {
            return Err(corrupt("invalid block length"));
        }

        let deltas = bitpack_decode(self.data, &mut self.pos, count)?;
        let tfs = bitpack_decode(self.data, &mut self.pos, count)?;
        let total: usize = tfs.iter().map(|&tf| tf as usize).sum();
        let position_deltas = bitpack_decode(self.data, &mut self.pos, total)?;

        if self.pos + 4 > self.data.len() {
            return Err(corrupt("truncated block trailer"));
        }
        self.pos += 4;

        self.current_block.clear();
        let mut cursor = 0usize;
        for (delta, tf) in deltas.into_iter().zip(tfs) {
            let docno = match self.last_docno {
                Some(last) => last
                    .checked_add(delta)
                    .filter(|_| delta > 0)
                    .ok_or_else(|| corrupt("docnos not increasing"))?,
                None => delta,
            };
            self.last_docno = Some(docno);

            let mut positions = Vec::with_capacity(tf as usize);
            let mut position = 0u32;
            for (i, d) in position_deltas[cursor..cursor + tf as usize].iter().enumerate() {
                position = if i == 0 { *d } else { position + d };
                positions.push(position);
            }
            cursor += tf as usize;
            self.current_block.push(Posting::new(DocNo(docno), positions));
        }

        self.block_pos = 0;
        self.current_block_idx += 1;
        Ok(true)
    }
}

impl<'a> Iterator for PostingIterator<'a> {
    type Item = io::Result<Posting>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.block_pos >= self.current_block.len() {
            match self.load_next_block() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        let posting = self.current_block.get(self.block_pos).cloned();
        self.block_pos += 1;
        posting.map(Ok)
    }
}
