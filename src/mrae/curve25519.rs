//! Curve25519 Field and Scalar Arithmetic
//!
//! Constant-time scalar multiplication over Curve25519 using the classic
//! 16-limb representation: each field element is sixteen `i64` limbs of
//! 16 stored bits (redundant 25.5-bit range during products), reduced mod
//! 2^255 - 19 by `car25519`/`pack25519`. Every branch that depends on
//! secret data goes through `sel25519` (arithmetic conditional swap); no
//! big-integer shortcuts, no table lookups indexed by secret bits.
//!
//! This module is the leaf dependency of both X25519 key agreement
//! ([`scalar_mult`]) and Ed25519 verification (which reuses the field ops
//! via `pub(crate)` items).

use crate::error::{Error, Result};

/// A field element: 16 little-endian limbs of 16 bits each.
pub(crate) type Gf = [i64; 16];

pub(crate) const GF0: Gf = [0; 16];
pub(crate) const GF1: Gf = [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// (A - 2) / 4 for the Montgomery ladder: 121665.
const GF_121665: Gf = [0xdb41, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// The Montgomery base point u = 9.
const BASE_POINT: [u8; 32] = [
    9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0,
];

/// Carry propagation: brings every limb back into 16 stored bits, folding
/// the top carry into limb 0 with the 2^256 = 38 (mod 2^255 - 19) identity.
pub(crate) fn car25519(o: &mut Gf) {
    for i in 0..16 {
        o[i] += 1 << 16;
        let c = o[i] >> 16;
        let next = (i + 1) * usize::from(i < 15);
        o[next] += c - 1 + 37 * (c - 1) * i64::from(i == 15);
        o[i] -= c << 16;
    }
}

/// Constant-time conditional swap of `p` and `q` when `b == 1`.
pub(crate) fn sel25519(p: &mut Gf, q: &mut Gf, b: i64) {
    let c = !(b - 1);
    for i in 0..16 {
        let t = c & (p[i] ^ q[i]);
        p[i] ^= t;
        q[i] ^= t;
    }
}

/// Freeze a field element to its canonical 32-byte little-endian form.
pub(crate) fn pack25519(o: &mut [u8; 32], n: &Gf) {
    let mut t = *n;
    car25519(&mut t);
    car25519(&mut t);
    car25519(&mut t);
    // Subtract p twice in constant time, keeping the in-range candidate.
    for _ in 0..2 {
        let mut m = GF0;
        m[0] = t[0] - 0xffed;
        for i in 1..15 {
            m[i] = t[i] - 0xffff - ((m[i - 1] >> 16) & 1);
            m[i - 1] &= 0xffff;
        }
        m[15] = t[15] - 0x7fff - ((m[14] >> 16) & 1);
        let b = (m[15] >> 16) & 1;
        m[14] &= 0xffff;
        sel25519(&mut t, &mut m, 1 - b);
    }
    for i in 0..16 {
        o[2 * i] = (t[i] & 0xff) as u8;
        o[2 * i + 1] = (t[i] >> 8) as u8;
    }
}

/// Load a 32-byte little-endian value, masking the top bit.
pub(crate) fn unpack25519(n: &[u8; 32]) -> Gf {
    let mut o = GF0;
    for i in 0..16 {
        o[i] = i64::from(n[2 * i]) + (i64::from(n[2 * i + 1]) << 8);
    }
    o[15] &= 0x7fff;
    o
}

/// o = a + b (no reduction; limbs stay well within i64).
pub(crate) fn add(o: &mut Gf, a: &Gf, b: &Gf) {
    for i in 0..16 {
        o[i] = a[i] + b[i];
    }
}

/// o = a - b.
pub(crate) fn sub(o: &mut Gf, a: &Gf, b: &Gf) {
    for i in 0..16 {
        o[i] = a[i] - b[i];
    }
}

/// o = a * b with schoolbook limb products and 38-fold wraparound.
pub(crate) fn mul(o: &mut Gf, a: &Gf, b: &Gf) {
    let mut t = [0i64; 31];
    for i in 0..16 {
        for j in 0..16 {
            t[i + j] += a[i] * b[j];
        }
    }
    for i in 0..15 {
        t[i] += 38 * t[i + 16];
    }
    o.copy_from_slice(&t[..16]);
    car25519(o);
    car25519(o);
}

/// o = a^2.
pub(crate) fn square(o: &mut Gf, a: &Gf) {
    let a2 = *a;
    mul(o, &a2, a);
}

/// Inversion by exponentiation with p - 2 (Fermat), fixed 254-step chain.
pub(crate) fn inv25519(o: &mut Gf, i: &Gf) {
    let mut c = *i;
    for a in (0..=253).rev() {
        let tmp = c;
        square(&mut c, &tmp);
        if a != 2 && a != 4 {
            let tmp = c;
            mul(&mut c, &tmp, i);
        }
    }
    *o = c;
}

/// Exponentiation with (p - 5) / 8, used for square-root extraction in
/// Ed25519 point decompression.
pub(crate) fn pow2523(o: &mut Gf, i: &Gf) {
    let mut c = *i;
    for a in (0..=250).rev() {
        let tmp = c;
        square(&mut c, &tmp);
        if a != 1 {
            let tmp = c;
            mul(&mut c, &tmp, i);
        }
    }
    *o = c;
}

/// Constant-time comparison of two canonical 32-byte encodings.
pub(crate) fn verify_32(x: &[u8; 32], y: &[u8; 32]) -> bool {
    let mut d: u32 = 0;
    for i in 0..32 {
        d |= u32::from(x[i] ^ y[i]);
    }
    // 0 iff all bytes matched.
    (1 & ((d.wrapping_sub(1)) >> 8)) == 1
}

/// Whether two field elements differ (after freezing).
pub(crate) fn neq25519(a: &Gf, b: &Gf) -> bool {
    let mut c = [0u8; 32];
    let mut d = [0u8; 32];
    pack25519(&mut c, a);
    pack25519(&mut d, b);
    !verify_32(&c, &d)
}

/// Low bit of the canonical encoding (the "parity" used as the x sign).
pub(crate) fn par25519(a: &Gf) -> u8 {
    let mut d = [0u8; 32];
    pack25519(&mut d, a);
    d[0] & 1
}

/// X25519: multiply the point `p` by the clamped scalar `n`.
///
/// Fixed 255-iteration Montgomery ladder; the only data-dependent values
/// feed `sel25519` swaps, never branches or indices.
pub fn scalar_mult(n: &[u8; 32], p: &[u8; 32]) -> [u8; 32] {
    let mut z = *n;
    z[31] = (n[31] & 127) | 64;
    z[0] &= 248;

    let x = unpack25519(p);
    let mut a = GF0;
    let mut b = x;
    let mut c = GF0;
    let mut d = GF0;
    let mut e = GF0;
    let mut f = GF0;
    a[0] = 1;
    d[0] = 1;

    for i in (0..=254).rev() {
        let r = i64::from((z[i >> 3] >> (i & 7)) & 1);
        sel25519(&mut a, &mut b, r);
        sel25519(&mut c, &mut d, r);
        add(&mut e, &a, &c);
        let t = a;
        sub(&mut a, &t, &c);
        add(&mut c, &b, &d);
        let t = b;
        sub(&mut b, &t, &d);
        square(&mut d, &e);
        square(&mut f, &a);
        let t = a;
        mul(&mut a, &c, &t);
        mul(&mut c, &b, &e);
        add(&mut e, &a, &c);
        let t = a;
        sub(&mut a, &t, &c);
        square(&mut b, &a);
        sub(&mut c, &d, &f);
        let t = c;
        mul(&mut a, &t, &GF_121665);
        let t = a;
        add(&mut a, &t, &d);
        let t = c;
        mul(&mut c, &t, &a);
        mul(&mut a, &d, &f);
        mul(&mut d, &b, &x);
        square(&mut b, &e);
        sel25519(&mut a, &mut b, r);
        sel25519(&mut c, &mut d, r);
    }

    let mut c_inv = GF0;
    inv25519(&mut c_inv, &c);
    let t = a;
    mul(&mut a, &t, &c_inv);
    let mut q = [0u8; 32];
    pack25519(&mut q, &a);
    q
}

/// X25519 against the standard base point u = 9.
pub fn scalar_mult_base(n: &[u8; 32]) -> [u8; 32] {
    scalar_mult(n, &BASE_POINT)
}

/// Slice-validating entry point for [`scalar_mult`].
pub fn scalar_mult_checked(n: &[u8], p: &[u8]) -> Result<[u8; 32]> {
    let n: &[u8; 32] = n.try_into().map_err(|_| Error::InvalidLength {
        kind: "scalar",
        expected: 32,
        actual: n.len(),
    })?;
    let p: &[u8; 32] = p.try_into().map_err(|_| Error::InvalidLength {
        kind: "point",
        expected: 32,
        actual: p.len(),
    })?;
    Ok(scalar_mult(n, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex32(s: &str) -> [u8; 32] {
        let v = hex::decode(s).unwrap();
        v.try_into().unwrap()
    }

    #[test]
    fn test_rfc7748_vector_one() {
        // First test vector from RFC 7748 §5.2.
        let scalar = hex32("a546e36bf0527c9d3b16154b82465edd62144c0ac1fc5a18506a2244ba449ac4");
        let point = hex32("e6db6867583030db3594c1a424b15f7c726624ec26b3353b10a903a6d0ab1c4c");
        let expected = hex32("c3da55379de9c6908e94ea4df28d084f32eccf03491c71f754b4075577a28552");
        assert_eq!(scalar_mult(&scalar, &point), expected);
    }

    #[test]
    fn test_rfc7748_vector_two() {
        // Second test vector from RFC 7748 §5.2.
        let scalar = hex32("4b66e9d4d1b4673c5ad22691957d6af5c11b6421e0ea01d42ca4169e7918ba0d");
        let point = hex32("e5210f12786811d3f4b7959d0538ae2c31dbe7106fc03c3efc4cd549c715a493");
        let expected = hex32("95cbde9476e8907d7aade45cb4b873f88b595a68799fa152e6f8f7647aac7957");
        assert_eq!(scalar_mult(&scalar, &point), expected);
    }

    #[test]
    fn test_iterated_base_point_multiplication() {
        // 200 rounds of base-point multiplication starting from scalar 1.
        let mut scalar = [0u8; 32];
        scalar[0] = 1;
        for _ in 0..200 {
            scalar = scalar_mult_base(&scalar);
        }
        assert_eq!(
            &scalar[..15],
            &hex::decode("89161fde887b2b53de549af4839401").unwrap()[..]
        );
    }

    #[test]
    fn test_matches_dalek_on_random_inputs() {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        for _ in 0..8 {
            let mut scalar = [0u8; 32];
            rng.fill_bytes(&mut scalar);
            let ours = scalar_mult_base(&scalar);
            let theirs =
                x25519_dalek::x25519(scalar, x25519_dalek::X25519_BASEPOINT_BYTES);
            assert_eq!(ours, theirs);
        }
    }

    #[test]
    fn test_diffie_hellman_agreement() {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        rng.fill_bytes(&mut a);
        rng.fill_bytes(&mut b);
        let pa = scalar_mult_base(&a);
        let pb = scalar_mult_base(&b);
        assert_eq!(scalar_mult(&a, &pb), scalar_mult(&b, &pa));
    }

    #[test]
    fn test_checked_rejects_wrong_lengths() {
        let err = scalar_mult_checked(&[0u8; 31], &[0u8; 32]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::InvalidLength { kind: "scalar", expected: 32, actual: 31 }
        ));
        let err = scalar_mult_checked(&[0u8; 32], &[0u8; 33]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::InvalidLength { kind: "point", expected: 32, actual: 33 }
        ));
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let bytes = hex32("4701d08488451f545a409fb58ae3e58581ca40ac3f7f114698cd71deac73ca01");
        let mut out = [0u8; 32];
        pack25519(&mut out, &unpack25519(&bytes));
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_field_inverse() {
        let x = unpack25519(&hex32(
            "4701d08488451f545a409fb58ae3e58581ca40ac3f7f114698cd71deac73ca01",
        ));
        let mut xi = GF0;
        inv25519(&mut xi, &x);
        let mut prod = GF0;
        mul(&mut prod, &x, &xi);
        assert!(!neq25519(&prod, &GF1));
    }
}
