//! VCDIFF (RFC 3284) decoder covering what xdelta3 emits without secondary
//! compression: default code table, source/target windows, the xdelta3
//! application header and per-window Adler-32.

use crate::error::DeltaError;

const MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];

const HDR_SECONDARY: u8 = 0x01;
const HDR_CODETABLE: u8 = 0x02;
const HDR_APPHEADER: u8 = 0x04;

const WIN_SOURCE: u8 = 0x01;
const WIN_TARGET: u8 = 0x02;
const WIN_ADLER32: u8 = 0x04;

/// xdelta3 never encodes a target window above 16 MiB.
const MAX_WINDOW_LEN: usize = 1 << 24;

const NEAR_SLOTS: usize = 4;
const SAME_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Noop,
    Add,
    Run,
    Copy,
}

#[derive(Debug, Clone, Copy)]
struct Inst {
    op: Op,
    size: u8,
    mode: u8,
}

const NOOP: Inst = Inst {
    op: Op::Noop,
    size: 0,
    mode: 0,
};

fn inst(op: Op, size: u8, mode: u8) -> Inst {
    Inst { op, size, mode }
}

fn default_code_table() -> Vec<(Inst, Inst)> {
    let mut table = Vec::with_capacity(256);
    table.push((inst(Op::Run, 0, 0), NOOP));
    for size in 0..=17 {
        table.push((inst(Op::Add, size, 0), NOOP));
    }
    for mode in 0..=8 {
        table.push((inst(Op::Copy, 0, mode), NOOP));
        for size in 4..=18 {
            table.push((inst(Op::Copy, size, mode), NOOP));
        }
    }
    for mode in 0..=5 {
        for add_size in 1..=4 {
            for copy_size in 4..=6 {
                table.push((inst(Op::Add, add_size, 0), inst(Op::Copy, copy_size, mode)));
            }
        }
    }
    for mode in 6..=8 {
        for add_size in 1..=4 {
            table.push((inst(Op::Add, add_size, 0), inst(Op::Copy, 4, mode)));
        }
    }
    for mode in 0..=8 {
        table.push((inst(Op::Copy, 4, mode), inst(Op::Add, 1, 0)));
    }
    debug_assert_eq!(table.len(), 256);
    table
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub secondary_compressor: Option<u8>,
    pub custom_code_table: bool,
}

impl HeaderInfo {
    pub fn natively_decodable(&self) -> bool {
        self.secondary_compressor.is_none() && !self.custom_code_table
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn byte(&mut self) -> Result<u8, DeltaError> {
        let value = *self.data.get(self.pos).ok_or(DeltaError::Truncated)?;
        self.pos += 1;
        Ok(value)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], DeltaError> {
        let end = self.pos.checked_add(len).ok_or(DeltaError::Overflow)?;
        let slice = self.data.get(self.pos..end).ok_or(DeltaError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn integer(&mut self) -> Result<u64, DeltaError> {
        let mut value: u64 = 0;
        loop {
            let byte = self.byte()?;
            if value > (u64::MAX >> 7) {
                return Err(DeltaError::Overflow);
            }
            value = (value << 7) | u64::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    fn size(&mut self) -> Result<usize, DeltaError> {
        usize::try_from(self.integer()?).map_err(|_| DeltaError::Overflow)
    }
}

struct AddressCache {
    near: [u64; NEAR_SLOTS],
    next_slot: usize,
    same: Vec<u64>,
}

impl AddressCache {
    fn new() -> Self {
        Self {
            near: [0; NEAR_SLOTS],
            next_slot: 0,
            same: vec![0; SAME_SLOTS * 256],
        }
    }

    fn decode(&mut self, here: u64, mode: u8, addrs: &mut Cursor<'_>) -> Result<u64, DeltaError> {
        let mode = usize::from(mode);
        let addr = match mode {
            0 => addrs.integer()?,
            1 => here
                .checked_sub(addrs.integer()?)
                .ok_or(DeltaError::Overflow)?,
            m if m < 2 + NEAR_SLOTS => self.near[m - 2]
                .checked_add(addrs.integer()?)
                .ok_or(DeltaError::Overflow)?,
            m if m < 2 + NEAR_SLOTS + SAME_SLOTS => {
                let slot = (m - 2 - NEAR_SLOTS) * 256 + usize::from(addrs.byte()?);
                self.same[slot]
            }
            _ => return Err(DeltaError::Unsupported("address mode")),
        };
        self.near[self.next_slot] = addr;
        self.next_slot = (self.next_slot + 1) % NEAR_SLOTS;
        let same_len = self.same.len() as u64;
        self.same[(addr % same_len) as usize] = addr;
        Ok(addr)
    }
}

pub fn read_header(delta: &[u8]) -> Result<(HeaderInfo, usize), DeltaError> {
    let mut cursor = Cursor::new(delta);
    let magic = cursor.bytes(3).map_err(|_| DeltaError::BadMagic)?;
    if magic != MAGIC {
        return Err(DeltaError::BadMagic);
    }
    let _version = cursor.byte()?;
    let indicator = cursor.byte()?;
    let secondary_compressor = if indicator & HDR_SECONDARY != 0 {
        Some(cursor.byte()?)
    } else {
        None
    };
    let custom_code_table = indicator & HDR_CODETABLE != 0;
    if custom_code_table {
        let len = cursor.size()?;
        cursor.bytes(len)?;
    }
    if indicator & HDR_APPHEADER != 0 {
        let len = cursor.size()?;
        cursor.bytes(len)?;
    }
    Ok((
        HeaderInfo {
            secondary_compressor,
            custom_code_table,
        },
        cursor.pos,
    ))
}

/// Reconstructs the target from `source` and a VCDIFF `delta`.
///
/// With `verify` set, windows carrying an Adler-32 are checked after decoding.
pub fn decode(source: &[u8], delta: &[u8], verify: bool) -> Result<Vec<u8>, DeltaError> {
    let (header, start) = read_header(delta)?;
    if header.secondary_compressor.is_some() {
        return Err(DeltaError::Unsupported("secondary compression"));
    }
    if header.custom_code_table {
        return Err(DeltaError::Unsupported("custom code table"));
    }

    let table = default_code_table();
    let mut cursor = Cursor::new(&delta[start..]);
    let mut target = Vec::new();
    while !cursor.is_empty() {
        decode_window(&mut cursor, &table, source, &mut target, verify)?;
    }
    Ok(target)
}

fn decode_window(
    cursor: &mut Cursor<'_>,
    table: &[(Inst, Inst)],
    source: &[u8],
    target: &mut Vec<u8>,
    verify: bool,
) -> Result<(), DeltaError> {
    let indicator = cursor.byte()?;
    let segment: Option<(usize, usize, bool)> = if indicator & (WIN_SOURCE | WIN_TARGET) != 0 {
        let len = cursor.size()?;
        let pos = cursor.size()?;
        Some((len, pos, indicator & WIN_TARGET != 0))
    } else {
        None
    };

    let _encoding_len = cursor.size()?;
    let window_len = cursor.size()?;
    if window_len > MAX_WINDOW_LEN {
        return Err(DeltaError::WindowTooLarge(window_len));
    }
    let delta_indicator = cursor.byte()?;
    if delta_indicator != 0 {
        return Err(DeltaError::Unsupported("compressed window sections"));
    }
    let data_len = cursor.size()?;
    let inst_len = cursor.size()?;
    let addr_len = cursor.size()?;
    let checksum = if indicator & WIN_ADLER32 != 0 {
        let raw = cursor.bytes(4)?;
        Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    } else {
        None
    };
    let mut data = Cursor::new(cursor.bytes(data_len)?);
    let mut insts = Cursor::new(cursor.bytes(inst_len)?);
    let mut addrs = Cursor::new(cursor.bytes(addr_len)?);

    let segment_bytes: Vec<u8> = match segment {
        Some((len, pos, from_target)) => {
            let end = pos.checked_add(len).ok_or(DeltaError::Overflow)?;
            let base = if from_target { &target[..] } else { source };
            base.get(pos..end)
                .ok_or(DeltaError::BadSourceSegment)?
                .to_vec()
        }
        None => Vec::new(),
    };

    let window_start = target.len();
    target.reserve(window_len);
    let mut cache = AddressCache::new();

    while !insts.is_empty() {
        let index = usize::from(insts.byte()?);
        let (first, second) = table[index];
        for step in [first, second] {
            if step.op == Op::Noop {
                continue;
            }
            let size = if step.size == 0 {
                insts.size()?
            } else {
                usize::from(step.size)
            };
            let written = target.len() - window_start;
            if written + size > window_len {
                return Err(DeltaError::BadInstruction(target.len()));
            }
            match step.op {
                Op::Add => target.extend_from_slice(data.bytes(size)?),
                Op::Run => {
                    let byte = data.byte()?;
                    target.resize(target.len() + size, byte);
                }
                Op::Copy => {
                    let here = (segment_bytes.len() + written) as u64;
                    let addr = cache.decode(here, step.mode, &mut addrs)?;
                    if addr >= here {
                        return Err(DeltaError::BadAddress {
                            addr,
                            at: target.len(),
                        });
                    }
                    copy_from(&segment_bytes, target, window_start, addr as usize, size);
                }
                Op::Noop => {}
            }
        }
    }

    if target.len() - window_start != window_len {
        return Err(DeltaError::BadInstruction(target.len()));
    }

    if verify {
        if let Some(expected) = checksum {
            let actual = adler32(&target[window_start..]);
            if actual != expected {
                return Err(DeltaError::ChecksumMismatch { expected, actual });
            }
        }
    }
    Ok(())
}

/// COPY from the combined source-segment + window address space. Target-side
/// copies may overlap the bytes being written, so they go one byte at a time.
fn copy_from(segment: &[u8], target: &mut Vec<u8>, window_start: usize, addr: usize, size: usize) {
    let mut addr = addr;
    let mut remaining = size;
    if addr < segment.len() {
        let take = remaining.min(segment.len() - addr);
        target.extend_from_slice(&segment[addr..addr + take]);
        addr += take;
        remaining -= take;
    }
    let mut from = window_start + (addr - segment.len().min(addr));
    for _ in 0..remaining {
        let byte = target[from];
        target.push(byte);
        from += 1;
    }
}

pub fn adler32(bytes: &[u8]) -> u32 {
    const MOD: u32 = 65521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for chunk in bytes.chunks(5552) {
        for byte in chunk {
            a += u32::from(*byte);
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}
