//! patch encoder
//!
//! classic suffix-sort construction: a sorted suffix array over the old
//! file answers longest-match queries while the new file is scanned once;
//! matched regions become diff-add instructions (old bytes plus small
//! corrections), the gaps between them become literal extra bytes.

use std::path::PathBuf;

use crate::error::{Error, Result};

use super::{write_i64, MAGIC};

/// compression level for the three patch streams
const LEVEL: i32 = 19;

/// suffix array by prefix doubling
fn suffix_array(data: &[u8]) -> Vec<usize> {
    let n = data.len();
    let mut sa: Vec<usize> = (0..n).collect();
    if n < 2 {
        return sa;
    }

    let mut rank: Vec<usize> = data.iter().map(|&b| b as usize).collect();
    let mut tmp = vec![0usize; n];
    let mut k = 1;
    while k < n {
        let key = |i: usize| {
            (
                rank[i],
                if i + k < n { rank[i + k] as isize } else { -1 },
            )
        };
        sa.sort_by_key(|&i| key(i));

        tmp[sa[0]] = 0;
        for j in 1..n {
            tmp[sa[j]] = tmp[sa[j - 1]] + usize::from(key(sa[j]) != key(sa[j - 1]));
        }
        let max_rank = tmp[sa[n - 1]];
        rank.copy_from_slice(&tmp);
        if max_rank == n - 1 {
            break;
        }
        k <<= 1;
    }
    sa
}

/// length of the common prefix of two slices
fn match_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// longest match of a prefix of `target` anywhere in `old`
///
/// returns (length, position in old). the best match sits next to the
/// insertion point of `target` in the sorted suffix order, so a binary
/// search narrows to an adjacent pair and both candidates are measured.
fn search(sa: &[usize], old: &[u8], target: &[u8]) -> (usize, usize) {
    if sa.is_empty() {
        return (0, 0);
    }
    let (mut st, mut en) = (0usize, sa.len() - 1);
    while en - st >= 2 {
        let mid = st + (en - st) / 2;
        let suffix = &old[sa[mid]..];
        let n = suffix.len().min(target.len());
        if suffix[..n] < target[..n] {
            st = mid;
        } else {
            en = mid;
        }
    }
    let st_len = match_len(&old[sa[st]..], target);
    let en_len = match_len(&old[sa[en]..], target);
    if st_len > en_len {
        (st_len, sa[st])
    } else {
        (en_len, sa[en])
    }
}

/// produce a patch transforming `old` into `new`
pub fn encode(old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    let sa = suffix_array(old);

    let mut ctrl: Vec<u8> = Vec::new();
    let mut diff: Vec<u8> = Vec::new();
    let mut extra: Vec<u8> = Vec::new();

    let mut scan: usize = 0;
    let mut len: usize = 0;
    let mut pos: usize = 0;
    let mut lastscan: usize = 0;
    let mut lastpos: usize = 0;
    let mut lastoffset: isize = 0;

    while scan < new.len() {
        let mut oldscore: isize = 0;
        scan += len;
        let mut scsc = scan;

        // advance until the best match at `scan` clearly beats just
        // extending the previous region at `lastoffset`
        loop {
            if scan >= new.len() {
                break;
            }
            let (l, p) = search(&sa, old, &new[scan..]);
            len = l;
            pos = p;

            while scsc < scan + len {
                let i = scsc as isize + lastoffset;
                if i >= 0 && (i as usize) < old.len() && old[i as usize] == new[scsc] {
                    oldscore += 1;
                }
                scsc += 1;
            }

            if (len as isize == oldscore && len != 0) || (len as isize > oldscore + 8) {
                break;
            }

            let i = scan as isize + lastoffset;
            if i >= 0 && (i as usize) < old.len() && old[i as usize] == new[scan] {
                oldscore -= 1;
            }
            scan += 1;
        }

        if len as isize != oldscore || scan == new.len() {
            // extend the previous region forward while at least half the
            // bytes still match the old file
            let mut lenf: usize = 0;
            {
                let mut s: isize = 0;
                let mut best: isize = 0;
                let mut i = 0usize;
                while lastscan + i < scan && lastpos + i < old.len() {
                    if old[lastpos + i] == new[lastscan + i] {
                        s += 1;
                    }
                    i += 1;
                    if s * 2 - i as isize > best * 2 - lenf as isize {
                        best = s;
                        lenf = i;
                    }
                }
            }

            // extend the new region backward the same way
            let mut lenb: usize = 0;
            if scan < new.len() {
                let mut s: isize = 0;
                let mut best: isize = 0;
                let mut i = 1usize;
                while scan >= lastscan + i && pos >= i {
                    if old[pos - i] == new[scan - i] {
                        s += 1;
                    }
                    if s * 2 - i as isize > best * 2 - lenb as isize {
                        best = s;
                        lenb = i;
                    }
                    i += 1;
                }
            }

            // the two extensions may overlap; split at the point that
            // favors whichever side matches better
            if lastscan + lenf > scan - lenb {
                let overlap = (lastscan + lenf) - (scan - lenb);
                let mut s: isize = 0;
                let mut best: isize = 0;
                let mut lens: usize = 0;
                for i in 0..overlap {
                    if new[lastscan + lenf - overlap + i] == old[lastpos + lenf - overlap + i] {
                        s += 1;
                    }
                    if new[scan - lenb + i] == old[pos - lenb + i] {
                        s -= 1;
                    }
                    if s > best {
                        best = s;
                        lens = i + 1;
                    }
                }
                lenf -= overlap;
                lenf += lens;
                lenb -= lens;
            }

            for i in 0..lenf {
                diff.push(new[lastscan + i].wrapping_sub(old[lastpos + i]));
            }
            let extra_len = (scan - lenb) - (lastscan + lenf);
            extra.extend_from_slice(&new[lastscan + lenf..scan - lenb]);

            let seek = (pos as i64 - lenb as i64) - (lastpos as i64 + lenf as i64);
            ctrl.extend_from_slice(&write_i64(lenf as i64));
            ctrl.extend_from_slice(&write_i64(extra_len as i64));
            ctrl.extend_from_slice(&write_i64(seek));

            lastscan = scan - lenb;
            lastpos = pos - lenb;
            lastoffset = pos as isize - scan as isize;
        }
    }

    let zstd_err = |e: std::io::Error| Error::Io {
        path: PathBuf::from("<zstd>"),
        source: e,
    };
    let ctrl_z = zstd::encode_all(&ctrl[..], LEVEL).map_err(zstd_err)?;
    let diff_z = zstd::encode_all(&diff[..], LEVEL).map_err(zstd_err)?;
    let extra_z = zstd::encode_all(&extra[..], LEVEL).map_err(zstd_err)?;

    let mut out = Vec::with_capacity(32 + ctrl_z.len() + diff_z.len() + extra_z.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&write_i64(ctrl_z.len() as i64));
    out.extend_from_slice(&write_i64(diff_z.len() as i64));
    out.extend_from_slice(&write_i64(new.len() as i64));
    out.extend_from_slice(&ctrl_z);
    out.extend_from_slice(&diff_z);
    out.extend_from_slice(&extra_z);
    Ok(out)
}
