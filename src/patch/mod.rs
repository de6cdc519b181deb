//! binary patch codec
//!
//! a patch is a self-contained file: an 8-byte magic tag, three signed
//! 64-bit length fields (compressed control length, compressed diff length,
//! target file size), then three independently zstd-compressed streams:
//!
//! - **control**: instruction triples `(copy_len, extra_len, seek)`
//! - **diff**: bytes added (mod 256) onto old-file bytes during a copy
//! - **extra**: literal bytes inserted verbatim
//!
//! applying a triple adds `copy_len` diff bytes onto `copy_len` old bytes
//! at the old cursor, copies `extra_len` extra bytes to the output, then
//! moves the old cursor by `seek` (which may be negative). every 64-bit
//! integer uses the sign-magnitude little-endian encoding of the bsdiff
//! format family: 63 magnitude bits, sign in the top bit of the last byte.

mod encode;

pub use encode::encode;

use std::io::{Read, Write};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// magic tag opening every patch file
pub const MAGIC: &[u8; 8] = b"ZSDIFF01";

/// size of the fixed header: magic plus three length fields
pub const HEADER_SIZE: usize = 32;

/// encode an integer in the sign-magnitude little-endian form
pub(crate) fn write_i64(x: i64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    let mut y = x.unsigned_abs();
    for b in buf.iter_mut() {
        *b = (y & 0xff) as u8;
        y >>= 8;
    }
    if x < 0 {
        buf[7] |= 0x80;
    }
    buf
}

/// decode an integer from the sign-magnitude little-endian form
///
/// expects exactly 8 bytes.
pub(crate) fn read_i64(buf: &[u8]) -> i64 {
    let mut y = (buf[7] & 0x7f) as u64;
    for &b in buf[..7].iter().rev() {
        y = (y << 8) | b as u64;
    }
    if buf[7] & 0x80 != 0 {
        -(y as i64)
    } else {
        y as i64
    }
}

fn out_err(e: std::io::Error) -> Error {
    Error::Io {
        path: PathBuf::from("<patch output>"),
        source: e,
    }
}

/// read until `buf` is full or the stream ends; returns bytes read
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        let k = r.read(&mut buf[n..])?;
        if k == 0 {
            break;
        }
        n += k;
    }
    Ok(n)
}

/// apply `patch` to `old`, streaming the target bytes into `out`
///
/// returns the number of bytes written, which always equals the target size
/// declared in the patch header; any discrepancy is a format error and the
/// live tree is never touched here.
pub fn decode<W: Write>(old: &[u8], patch: &[u8], out: &mut W) -> Result<u64> {
    if patch.len() < HEADER_SIZE {
        return Err(Error::CorruptPatch("truncated header"));
    }
    if &patch[..8] != MAGIC {
        return Err(Error::BadPatchMagic);
    }

    let ctrl_len = read_i64(&patch[8..16]);
    let diff_len = read_i64(&patch[16..24]);
    let target_size = read_i64(&patch[24..32]);
    if ctrl_len < 0 || diff_len < 0 || target_size < 0 {
        return Err(Error::CorruptPatch("negative header field"));
    }
    let (ctrl_len, diff_len) = (ctrl_len as usize, diff_len as usize);
    let target_size = target_size as u64;

    let body = &patch[HEADER_SIZE..];
    if body.len() < ctrl_len + diff_len {
        return Err(Error::CorruptPatch("stream lengths exceed patch size"));
    }
    let mut ctrl = zstd::Decoder::new(&body[..ctrl_len])
        .map_err(|_| Error::CorruptPatch("control stream"))?;
    let mut diff = zstd::Decoder::new(&body[ctrl_len..ctrl_len + diff_len])
        .map_err(|_| Error::CorruptPatch("diff stream"))?;
    let mut extra = zstd::Decoder::new(&body[ctrl_len + diff_len..])
        .map_err(|_| Error::CorruptPatch("extra stream"))?;

    let mut written = 0u64;
    let mut old_pos: i64 = 0;
    let mut triple = [0u8; 24];
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        match read_full(&mut ctrl, &mut triple)
            .map_err(|_| Error::CorruptPatch("control stream"))?
        {
            0 => break, // control stream exhausted: done
            24 => {}
            _ => return Err(Error::CorruptPatch("truncated control triple")),
        }

        let copy_len = read_i64(&triple[..8]);
        let extra_len = read_i64(&triple[8..16]);
        let seek = read_i64(&triple[16..24]);
        if copy_len < 0 || extra_len < 0 {
            return Err(Error::CorruptPatch("negative control field"));
        }

        // diff-add region: old bytes plus diff bytes, mod 256
        if copy_len > 0 {
            if old_pos < 0 || old.len() as i64 - old_pos < copy_len {
                return Err(Error::CorruptPatch("copy region outside old file"));
            }
            let total = copy_len as usize;
            let mut done = 0usize;
            while done < total {
                let n = buf.len().min(total - done);
                let chunk = &mut buf[..n];
                diff.read_exact(chunk)
                    .map_err(|_| Error::CorruptPatch("diff stream exhausted"))?;
                let base = old_pos as usize + done;
                for (b, o) in chunk.iter_mut().zip(&old[base..base + n]) {
                    *b = b.wrapping_add(*o);
                }
                out.write_all(chunk).map_err(out_err)?;
                done += n;
            }
            old_pos += copy_len;
            written += copy_len as u64;
        }

        // extra region: literal bytes
        if extra_len > 0 {
            let total = extra_len as usize;
            let mut done = 0usize;
            while done < total {
                let n = buf.len().min(total - done);
                let chunk = &mut buf[..n];
                extra
                    .read_exact(chunk)
                    .map_err(|_| Error::CorruptPatch("extra stream exhausted"))?;
                out.write_all(chunk).map_err(out_err)?;
                done += n;
            }
            written += extra_len as u64;
        }

        old_pos += seek;

        if written > target_size {
            return Err(Error::CorruptPatch("output exceeds target size"));
        }
    }

    if written != target_size {
        return Err(Error::CorruptPatch("output shorter than target size"));
    }
    Ok(written)
}

/// apply a patch, collecting the target into a buffer
pub fn decode_to_vec(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decode(old, patch, &mut out)?;
    Ok(out)
}
