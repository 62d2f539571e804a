//! The per-pass memory kernel.
//!
//! Every 16-element step loads four 4-lane vectors and writes them back one
//! slot to the right with non-temporal stores, putting [`PATTERN`] in the
//! slot that was vacated:
//!
//! ```text
//! before: [ v0 | v1 | v2 | v3 ]
//! after:  [ P  | v0 | v1 | v2 ]
//! ```
//!
//! The values are irrelevant; the shape (4 loads, 4 stores) is what drives
//! the memory traffic.

use crate::config::{BUFFER_ALIGN, BYTES_PER_STEP, PATTERN, VECTOR_STEP};

/// Widest non-temporal store the start of a range allows.
///
/// The buffer base is 32-byte aligned, but a partition can begin on any
/// `u64`, i.e. 8, 16 or 24 bytes past a vector boundary. Those ranges still
/// stream, just in narrower pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamWidth {
    /// `_mm256_stream_si256`, 32 bytes.
    Ymm,
    /// `_mm_stream_si128`, 16 bytes.
    Xmm,
    /// `_mm_stream_si64`, 8 bytes.
    Qword,
}

impl StreamWidth {
    pub fn for_ptr(ptr: *const u64) -> Self {
        match ptr as usize % BUFFER_ALIGN {
            0 => StreamWidth::Ymm,
            16 => StreamWidth::Xmm,
            _ => StreamWidth::Qword,
        }
    }
}

/// Which implementation of the sweep runs on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// AVX2 loads with `_mm256_stream_si256` stores.
    Avx2,
    /// Plain scalar code with the same load/store shape.
    Portable,
}

impl Kernel {
    /// Picks the fastest kernel the running CPU supports.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("avx2") {
                return Kernel::Avx2;
            }
        }
        Kernel::Portable
    }

    pub fn name(self) -> &'static str {
        match self {
            Kernel::Avx2 => "avx2-stream",
            Kernel::Portable => "portable",
        }
    }

    /// Runs one pass over `data` and returns the bytes credited for it.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` is not a multiple of [`VECTOR_STEP`].
    pub fn sweep(self, data: &mut [u64]) -> u64 {
        assert!(
            data.len() % VECTOR_STEP == 0,
            "Range length {} is not a multiple of {}",
            data.len(),
            VECTOR_STEP
        );

        if data.is_empty() {
            return 0;
        }

        match self {
            #[cfg(target_arch = "x86_64")]
            Kernel::Avx2 => {
                assert!(
                    std::arch::is_x86_feature_detected!("avx2"),
                    "AVX2 kernel selected on a CPU without AVX2"
                );
                // SAFETY: AVX2 support checked above, length is a whole number of steps.
                unsafe {
                    match StreamWidth::for_ptr(data.as_ptr()) {
                        StreamWidth::Ymm => avx2::sweep_aligned(data),
                        StreamWidth::Xmm => avx2::sweep_offset::<true>(data),
                        StreamWidth::Qword => avx2::sweep_offset::<false>(data),
                    }
                }
            }
            #[cfg(not(target_arch = "x86_64"))]
            Kernel::Avx2 => sweep_portable(data),
            Kernel::Portable => sweep_portable(data),
        }
    }
}

fn sweep_portable(data: &mut [u64]) -> u64 {
    let mut bytes = 0;

    for step in data.chunks_exact_mut(VECTOR_STEP) {
        let mut lanes = [[0u64; 4]; 4];
        for (vector, src) in lanes.iter_mut().zip(step.chunks_exact(4)) {
            vector.copy_from_slice(src);
        }

        step[0..4].fill(PATTERN);
        step[4..8].copy_from_slice(&lanes[0]);
        step[8..12].copy_from_slice(&lanes[1]);
        step[12..16].copy_from_slice(&lanes[2]);
        // keep the fourth load
        std::hint::black_box(&lanes[3]);

        bytes += BYTES_PER_STEP;
    }

    bytes
}

#[cfg(target_arch = "x86_64")]
mod avx2 {
    use std::arch::x86_64::*;

    use crate::config::{BYTES_PER_STEP, PATTERN, VECTOR_STEP};

    /// # Safety
    ///
    /// The CPU must support AVX2, `data` must start on a 32-byte boundary and
    /// its length must be a multiple of [`VECTOR_STEP`].
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn sweep_aligned(data: &mut [u64]) -> u64 {
        let len = data.len();
        let base = data.as_mut_ptr();
        let mut bytes = 0;

        unsafe {
            let pattern = _mm256_set1_epi64x(PATTERN as i64);

            let mut i = 0;
            while i < len {
                let p = base.add(i) as *mut __m256i;

                let d1 = _mm256_load_si256(p);
                let d2 = _mm256_load_si256(p.add(1));
                let d3 = _mm256_load_si256(p.add(2));
                let d4 = _mm256_load_si256(p.add(3));

                _mm256_stream_si256(p, pattern);
                _mm256_stream_si256(p.add(1), d1);
                _mm256_stream_si256(p.add(2), d2);
                _mm256_stream_si256(p.add(3), d3);
                std::hint::black_box(d4);

                bytes += BYTES_PER_STEP;
                i += VECTOR_STEP;
            }

            // Streaming stores are weakly ordered; publish them before the
            // pass is considered done.
            _mm_sfence();
        }

        bytes
    }

    /// Same traffic as [`sweep_aligned`] for ranges that start off a
    /// 32-byte boundary: unaligned loads, and each 32-byte store split into
    /// two 16-byte (`XMM = true`) or four 8-byte non-temporal stores.
    ///
    /// # Safety
    ///
    /// The CPU must support AVX2, `data` must start on a 16-byte boundary
    /// when `XMM` is set, and its length must be a multiple of [`VECTOR_STEP`].
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn sweep_offset<const XMM: bool>(data: &mut [u64]) -> u64 {
        let len = data.len();
        let base = data.as_mut_ptr();
        let mut bytes = 0;

        unsafe {
            let pattern = _mm256_set1_epi64x(PATTERN as i64);

            let mut i = 0;
            while i < len {
                let p = base.add(i) as *mut __m256i;

                let d1 = _mm256_loadu_si256(p);
                let d2 = _mm256_loadu_si256(p.add(1));
                let d3 = _mm256_loadu_si256(p.add(2));
                let d4 = _mm256_loadu_si256(p.add(3));

                stream_split::<XMM>(p, pattern);
                stream_split::<XMM>(p.add(1), d1);
                stream_split::<XMM>(p.add(2), d2);
                stream_split::<XMM>(p.add(3), d3);
                std::hint::black_box(d4);

                bytes += BYTES_PER_STEP;
                i += VECTOR_STEP;
            }

            _mm_sfence();
        }

        bytes
    }

    #[target_feature(enable = "avx2")]
    #[inline]
    unsafe fn stream_split<const XMM: bool>(p: *mut __m256i, v: __m256i) {
        unsafe {
            if XMM {
                let q = p as *mut __m128i;
                _mm_stream_si128(q, _mm256_castsi256_si128(v));
                _mm_stream_si128(q.add(1), _mm256_extracti128_si256::<1>(v));
            } else {
                let q = p as *mut i64;
                _mm_stream_si64(q, _mm256_extract_epi64::<0>(v));
                _mm_stream_si64(q.add(1), _mm256_extract_epi64::<1>(v));
                _mm_stream_si64(q.add(2), _mm256_extract_epi64::<2>(v));
                _mm_stream_si64(q.add(3), _mm256_extract_epi64::<3>(v));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SharedBuffer;

    fn kernels() -> Vec<Kernel> {
        let mut kernels = vec![Kernel::Portable];
        if Kernel::detect() == Kernel::Avx2 {
            kernels.push(Kernel::Avx2);
        }
        kernels
    }

    #[test]
    fn one_pass_rotates_and_stamps_pattern() {
        for kernel in kernels() {
            let mut data: Vec<u64> = (0..32).collect();
            let bytes = kernel.sweep(&mut data);

            assert_eq!(bytes, 2 * BYTES_PER_STEP, "kernel {}", kernel.name());
            for step in 0..2 {
                let base = (step * VECTOR_STEP) as u64;
                let s = &data[step * VECTOR_STEP..(step + 1) * VECTOR_STEP];
                assert_eq!(&s[0..4], &[PATTERN; 4]);
                assert_eq!(&s[4..8], &[base, base + 1, base + 2, base + 3]);
                assert_eq!(&s[8..12], &[base + 4, base + 5, base + 6, base + 7]);
                assert_eq!(&s[12..16], &[base + 8, base + 9, base + 10, base + 11]);
            }
        }
    }

    #[test]
    fn empty_range_moves_nothing() {
        for kernel in kernels() {
            assert_eq!(kernel.sweep(&mut []), 0);
        }
    }

    #[test]
    fn stream_width_follows_start_offset() {
        let buffer = SharedBuffer::new(8, 1).unwrap();
        let base = buffer.as_slice().as_ptr();

        let widths: Vec<StreamWidth> = (0..4)
            .map(|offset| StreamWidth::for_ptr(base.wrapping_add(offset)))
            .collect();
        assert_eq!(
            widths,
            vec![
                StreamWidth::Ymm,
                StreamWidth::Qword,
                StreamWidth::Xmm,
                StreamWidth::Qword
            ]
        );
    }

    #[test]
    fn offset_ranges_rotate_and_stay_in_bounds() {
        // offsets of 8, 16 and 24 bytes past the aligned base
        for offset in 1..4 {
            for kernel in kernels() {
                let mut buffer = SharedBuffer::new(64, 1).unwrap();
                let data = buffer.as_mut_slice();
                for (i, x) in data.iter_mut().enumerate() {
                    *x = i as u64;
                }

                let bytes = kernel.sweep(&mut data[offset..offset + 48]);
                assert_eq!(bytes, 3 * BYTES_PER_STEP);

                for index in (0..offset).chain(offset + 48..64) {
                    assert_eq!(
                        data[index], index as u64,
                        "kernel {} touched element {} outside offset {}",
                        kernel.name(),
                        index,
                        offset
                    );
                }
                for step in 0..3 {
                    let first = offset + step * VECTOR_STEP;
                    let s = &data[first..first + VECTOR_STEP];
                    let f = first as u64;
                    assert_eq!(&s[0..4], &[PATTERN; 4], "kernel {} offset {}", kernel.name(), offset);
                    assert_eq!(&s[4..8], &[f, f + 1, f + 2, f + 3]);
                    assert_eq!(&s[8..12], &[f + 4, f + 5, f + 6, f + 7]);
                    assert_eq!(&s[12..16], &[f + 8, f + 9, f + 10, f + 11]);
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "not a multiple of 16")]
    fn partial_step_is_rejected() {
        Kernel::Portable.sweep(&mut [0u64; 20]);
    }
}
