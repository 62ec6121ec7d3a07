//! CityHash128, version 1.0.2.
//!
//! Compressed frames are checksummed with this exact revision of the algorithm. Later CityHash
//! releases changed the output, so this is not interchangeable with current `cityhash` crates.

const K0: u64 = 0xc3a5_c85c_97cb_3127;
const K1: u64 = 0xb492_b66f_be98_f273;
const K2: u64 = 0x9ae1_6a3b_2f90_404f;
const K3: u64 = 0xc949_d7c7_509e_6557;
const K_MUL: u64 = 0x9ddf_ea08_eb38_2d69;

fn fetch64(s: &[u8], pos: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&s[pos..pos + 8]);
    u64::from_le_bytes(buf)
}

fn fetch32(s: &[u8], pos: usize) -> u64 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&s[pos..pos + 4]);
    u64::from(u32::from_le_bytes(buf))
}

fn shift_mix(v: u64) -> u64 {
    v ^ (v >> 47)
}

fn hash_len16(u: u64, v: u64) -> u64 {
    let mut a = (u ^ v).wrapping_mul(K_MUL);
    a ^= a >> 47;
    let mut b = (v ^ a).wrapping_mul(K_MUL);
    b ^= b >> 47;
    b.wrapping_mul(K_MUL)
}

fn hash_len0to16(s: &[u8]) -> u64 {
    let len = s.len();
    if len > 8 {
        let a = fetch64(s, 0);
        let b = fetch64(s, len - 8);
        // Shift is in 9..=16, so a plain rotation is equivalent.
        return hash_len16(a, b.wrapping_add(len as u64).rotate_right(len as u32)) ^ b;
    }
    if len >= 4 {
        let a = fetch32(s, 0);
        return hash_len16((len as u64).wrapping_add(a << 3), fetch32(s, len - 4));
    }
    if len > 0 {
        let a = u64::from(s[0]);
        let b = u64::from(s[len >> 1]);
        let c = u64::from(s[len - 1]);
        let y = a + (b << 8);
        let z = len as u64 + (c << 2);
        return shift_mix(y.wrapping_mul(K2) ^ z.wrapping_mul(K3)).wrapping_mul(K2);
    }
    K2
}

fn weak_hash_len32_with_seeds(s: &[u8], pos: usize, a: u64, b: u64) -> (u64, u64) {
    let w = fetch64(s, pos);
    let x = fetch64(s, pos + 8);
    let y = fetch64(s, pos + 16);
    let z = fetch64(s, pos + 24);

    let mut a = a.wrapping_add(w);
    let mut b = b.wrapping_add(a).wrapping_add(z).rotate_right(21);
    let c = a;
    a = a.wrapping_add(x).wrapping_add(y);
    b = b.wrapping_add(a.rotate_right(44));
    (a.wrapping_add(z), b.wrapping_add(c))
}

fn city_murmur(s: &[u8], seed: (u64, u64)) -> (u64, u64) {
    let len = s.len();
    let (mut a, mut b) = seed;
    let mut c;
    let mut d;

    if len <= 16 {
        a = shift_mix(a.wrapping_mul(K1)).wrapping_mul(K1);
        c = b.wrapping_mul(K1).wrapping_add(hash_len0to16(s));
        d = shift_mix(a.wrapping_add(if len >= 8 { fetch64(s, 0) } else { c }));
    } else {
        c = hash_len16(fetch64(s, len - 8).wrapping_add(K1), a);
        d = hash_len16(b.wrapping_add(len as u64), c.wrapping_add(fetch64(s, len - 16)));
        a = a.wrapping_add(d);
        let mut pos = 0;
        let mut remaining = len as isize - 16;
        while remaining > 0 {
            a ^= shift_mix(fetch64(s, pos).wrapping_mul(K1)).wrapping_mul(K1);
            a = a.wrapping_mul(K1);
            b ^= a;
            c ^= shift_mix(fetch64(s, pos + 8).wrapping_mul(K1)).wrapping_mul(K1);
            c = c.wrapping_mul(K1);
            d ^= c;
            pos += 16;
            remaining -= 16;
        }
    }

    a = hash_len16(a, c);
    b = hash_len16(d, b);
    (a ^ b, hash_len16(b, a))
}

fn city_hash128_with_seed(s: &[u8], seed: (u64, u64)) -> (u64, u64) {
    let mut len = s.len();
    if len < 128 {
        return city_murmur(s, seed);
    }

    let (mut x, mut y) = seed;
    let mut z = (len as u64).wrapping_mul(K1);
    let mut v0 = (y ^ K1).rotate_right(49).wrapping_mul(K1).wrapping_add(fetch64(s, 0));
    let mut v1 = v0.rotate_right(42).wrapping_mul(K1).wrapping_add(fetch64(s, 8));
    let mut w0 = y.wrapping_add(z).rotate_right(35).wrapping_mul(K1).wrapping_add(x);
    let mut w1 = x.wrapping_add(fetch64(s, 88)).rotate_right(53).wrapping_mul(K1);

    let mut pos = 0;
    loop {
        for _ in 0..2 {
            x = x
                .wrapping_add(y)
                .wrapping_add(v0)
                .wrapping_add(fetch64(s, pos + 16))
                .rotate_right(37)
                .wrapping_mul(K1);
            y = y.wrapping_add(v1).wrapping_add(fetch64(s, pos + 48)).rotate_right(42).wrapping_mul(K1);
            x ^= w1;
            y ^= v0;
            z = (z ^ w0).rotate_right(33);
            (v0, v1) = weak_hash_len32_with_seeds(s, pos, v1.wrapping_mul(K1), x.wrapping_add(w0));
            (w0, w1) = weak_hash_len32_with_seeds(s, pos + 32, z.wrapping_add(w1), y);
            std::mem::swap(&mut z, &mut x);
            pos += 64;
        }
        len -= 128;
        if len < 128 {
            break;
        }
    }

    y = y.wrapping_add(w0.rotate_right(37).wrapping_mul(K0)).wrapping_add(z);
    x = x.wrapping_add(v0.wrapping_add(z).rotate_right(49).wrapping_mul(K0));

    // Hash up to four 32-byte tail chunks, walking backwards from the end.
    let mut tail_done = 0;
    while tail_done < len {
        tail_done += 32;
        let chunk = pos + len - tail_done;
        y = (y.wrapping_sub(x)).rotate_right(42).wrapping_mul(K0).wrapping_add(v1);
        w0 = w0.wrapping_add(fetch64(s, chunk + 16));
        x = x.rotate_right(49).wrapping_mul(K0).wrapping_add(w0);
        w0 = w0.wrapping_add(v0);
        (v0, v1) = weak_hash_len32_with_seeds(s, chunk, v0, v1);
    }

    x = hash_len16(x, v0);
    y = hash_len16(y, w0);
    (
        hash_len16(x.wrapping_add(v1), w1).wrapping_add(y),
        hash_len16(x.wrapping_add(w1), y.wrapping_add(v1)),
    )
}

/// Returns the 128-bit hash as `(low, high)` 64-bit halves.
pub fn city_hash128(s: &[u8]) -> (u64, u64) {
    let len = s.len();
    if len >= 16 {
        city_hash128_with_seed(&s[16..], (fetch64(s, 0) ^ K3, fetch64(s, 8)))
    } else if len >= 8 {
        city_hash128_with_seed(&[], (fetch64(s, 0) ^ (len as u64).wrapping_mul(K0), fetch64(s, len - 8) ^ K1))
    } else {
        city_hash128_with_seed(s, (K0, K1))
    }
}
