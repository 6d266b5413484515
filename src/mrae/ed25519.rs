//! Ed25519 Signature Verification
//!
//! RFC 8032 verification over the twisted Edwards form of Curve25519,
//! built on the same 16-limb field arithmetic as the X25519 ladder. Both
//! the cofactorless check (`R == [s]B - [h]A`) and the cofactored check
//! (`[8]R == [8]([s]B - [h]A)`) are provided.
//!
//! Two classes of bad input are rejected with a plain `false` rather than
//! an error, matching constant-time verification conventions:
//!
//! - a public key `A` or signature component `R` lying in the 8-element
//!   torsion subgroup (small order)
//! - a scalar component `S >= L` (signature malleability)
//!
//! Canonical-encoding checks of `A` and `R` beyond field-element
//! unpacking are deliberately not performed; see DESIGN.md.

use sha2::{Digest, Sha512};

use super::curve25519::{
    add as fadd, inv25519, mul, neq25519, pack25519, par25519, pow2523, sel25519, square, sub,
    unpack25519, verify_32, Gf, GF0, GF1,
};
use crate::error::{Error, Result};

/// Edwards curve constant d.
const D: Gf = [
    0x78a3, 0x1359, 0x4dca, 0x75eb, 0xd8ab, 0x4141, 0x0a4d, 0x0070, 0xe898, 0x7779, 0x4079,
    0x8cc7, 0xfe73, 0x2b6f, 0x6cee, 0x5203,
];
/// 2d, used in the unified addition formula.
const D2: Gf = [
    0xf159, 0x26b2, 0x9b94, 0xebd6, 0xb156, 0x8283, 0x149a, 0x00e0, 0xd130, 0xeef3, 0x80f2,
    0x198e, 0xfce7, 0x56df, 0xd9dc, 0x2406,
];
/// Base point x coordinate.
const X: Gf = [
    0xd51a, 0x8f25, 0x2d60, 0xc956, 0xa7b2, 0x9525, 0xc760, 0x692c, 0xdc5c, 0xfdd6, 0xe231,
    0xc0a4, 0x53fe, 0xcd6e, 0x36d3, 0x2169,
];
/// Base point y coordinate.
const Y: Gf = [
    0x6658, 0x6666, 0x6666, 0x6666, 0x6666, 0x6666, 0x6666, 0x6666, 0x6666, 0x6666, 0x6666,
    0x6666, 0x6666, 0x6666, 0x6666, 0x6666,
];
/// sqrt(-1), for point decompression.
const SQRT_M1: Gf = [
    0xa0b0, 0x4a0e, 0x1b27, 0xc4ee, 0xe478, 0xad2f, 0x1806, 0x2f43, 0xd7a7, 0x3dfb, 0x0099,
    0x2b4d, 0xdf0b, 0x4fc1, 0x2480, 0x2b83,
];

/// Group order L = 2^252 + 27742317777372353535851937790883648493,
/// little-endian bytes.
const L: [u8; 32] = [
    0xed, 0xd3, 0xf5, 0x5c, 0x1a, 0x63, 0x12, 0x58, 0xd6, 0x9c, 0xf7, 0xa2, 0xde, 0xf9, 0xde,
    0x14, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10,
];

/// Canonical encoding of the neutral element (y = 1, sign 0).
const IDENTITY: [u8; 32] = [
    1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0,
];

/// A point in extended homogeneous coordinates (X : Y : Z : T), T = XY/Z.
type Point = [Gf; 4];

/// Selects between the RFC 8032 verification equations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// `[8]R == [8]([s]B - [h]A)`: accepts anything a batch verifier would.
    Cofactored,
    /// `R == [s]B - [h]A`: the strict single-signature equation.
    Cofactorless,
}

fn point_identity() -> Point {
    [GF0, GF1, GF1, GF0]
}

/// Unified Edwards addition, p += q.
fn point_add(p: &mut Point, q: &Point) {
    let mut a = GF0;
    let mut b = GF0;
    let mut c = GF0;
    let mut d = GF0;
    let mut e = GF0;
    let mut f = GF0;
    let mut g = GF0;
    let mut h = GF0;
    let mut t = GF0;

    sub(&mut a, &p[1], &p[0]);
    sub(&mut t, &q[1], &q[0]);
    let a0 = a;
    mul(&mut a, &a0, &t);
    fadd(&mut b, &p[0], &p[1]);
    fadd(&mut t, &q[0], &q[1]);
    let b0 = b;
    mul(&mut b, &b0, &t);
    mul(&mut c, &p[3], &q[3]);
    let c0 = c;
    mul(&mut c, &c0, &D2);
    mul(&mut d, &p[2], &q[2]);
    let d0 = d;
    fadd(&mut d, &d0, &d0);
    sub(&mut e, &b, &a);
    sub(&mut f, &d, &c);
    fadd(&mut g, &d, &c);
    fadd(&mut h, &b, &a);

    mul(&mut p[0], &e, &f);
    mul(&mut p[1], &h, &g);
    mul(&mut p[2], &g, &f);
    mul(&mut p[3], &e, &h);
}

/// Constant-time conditional swap of two points.
fn point_cswap(p: &mut Point, q: &mut Point, b: i64) {
    for i in 0..4 {
        sel25519(&mut p[i], &mut q[i], b);
    }
}

/// Compress a point to its canonical 32-byte encoding.
fn point_pack(r: &mut [u8; 32], p: &Point) {
    let mut zi = GF0;
    let mut tx = GF0;
    let mut ty = GF0;
    inv25519(&mut zi, &p[2]);
    mul(&mut tx, &p[0], &zi);
    mul(&mut ty, &p[1], &zi);
    pack25519(r, &ty);
    r[31] ^= par25519(&tx) << 7;
}

/// p = [s]q via a constant-time double-and-add ladder over all 256 bits.
fn point_scalar_mult(p: &mut Point, q: &mut Point, s: &[u8; 32]) {
    *p = point_identity();
    for i in (0..=255).rev() {
        let b = i64::from((s[i / 8] >> (i & 7)) & 1);
        point_cswap(p, q, b);
        let p_copy = *p;
        point_add(q, &p_copy);
        let p_copy = *p;
        point_add(p, &p_copy);
        point_cswap(p, q, b);
    }
}

/// p = [s]B for the Ed25519 base point B.
fn point_scalar_base(p: &mut Point, s: &[u8; 32]) {
    let mut q = point_identity();
    q[0] = X;
    q[1] = Y;
    mul(&mut q[3], &X, &Y);
    point_scalar_mult(p, &mut q, s);
}

/// Decompress `bytes` into the point with *negated* x coordinate, -P.
///
/// The negation is what the verification equation wants: with -A in hand,
/// `[s]B - [h]A` is just `[h](-A) + [s]B`. Returns `None` when the y
/// coordinate has no corresponding x on the curve.
fn point_unpack_neg(bytes: &[u8; 32]) -> Option<Point> {
    let mut r = point_identity();
    let mut t = GF0;
    let mut chk = GF0;
    let mut num = GF0;
    let mut den = GF0;
    let mut den2 = GF0;
    let mut den4 = GF0;
    let mut den6 = GF0;

    r[1] = unpack25519(bytes);
    // num = y² - 1, den = d·y² + 1
    square(&mut num, &r[1]);
    mul(&mut den, &num, &D);
    let num0 = num;
    sub(&mut num, &num0, &r[2]);
    let den0 = den;
    fadd(&mut den, &r[2], &den0);

    // x = num·den³·(num·den⁷)^((p-5)/8), then fix up by sqrt(-1) if needed.
    square(&mut den2, &den);
    square(&mut den4, &den2);
    mul(&mut den6, &den4, &den2);
    mul(&mut t, &den6, &num);
    let t0 = t;
    mul(&mut t, &t0, &den);
    let t0 = t;
    pow2523(&mut t, &t0);
    let t0 = t;
    mul(&mut t, &t0, &num);
    let t0 = t;
    mul(&mut t, &t0, &den);
    let t0 = t;
    mul(&mut t, &t0, &den);
    mul(&mut r[0], &t, &den);

    square(&mut chk, &r[0]);
    let chk0 = chk;
    mul(&mut chk, &chk0, &den);
    if neq25519(&chk, &num) {
        let x0 = r[0];
        mul(&mut r[0], &x0, &SQRT_M1);
    }
    square(&mut chk, &r[0]);
    let chk0 = chk;
    mul(&mut chk, &chk0, &den);
    if neq25519(&chk, &num) {
        return None;
    }

    if par25519(&r[0]) == bytes[31] >> 7 {
        let x0 = r[0];
        sub(&mut r[0], &GF0, &x0);
    }

    let (x0, y0) = (r[0], r[1]);
    mul(&mut r[3], &x0, &y0);
    Some(r)
}

/// Whether the encoded point sits in the 8-element torsion subgroup.
///
/// Decodes and multiplies by 8 (three doublings); small order iff the
/// result is the neutral element. Undecodable encodings count as small
/// order so callers reject them the same way.
fn is_small_order(bytes: &[u8; 32]) -> bool {
    let Some(mut p) = point_unpack_neg(bytes) else {
        return true;
    };
    for _ in 0..3 {
        let p_copy = p;
        point_add(&mut p, &p_copy);
    }
    let mut packed = [0u8; 32];
    point_pack(&mut packed, &p);
    verify_32(&packed, &IDENTITY)
}

/// Whether the scalar half `s` of a signature is canonical, i.e. `s < L`.
fn scalar_is_canonical(s: &[u8; 32]) -> bool {
    for i in (0..32).rev() {
        match s[i].cmp(&L[i]) {
            std::cmp::Ordering::Less => return true,
            std::cmp::Ordering::Greater => return false,
            std::cmp::Ordering::Equal => continue,
        }
    }
    // s == L exactly.
    false
}

/// Barrett-free reduction of a 64-byte value mod L (limb-wise carry
/// schedule over signed bytes).
fn mod_l(r: &mut [u8; 32], x: &mut [i64; 64]) {
    for i in (32..=63).rev() {
        let mut carry: i64 = 0;
        let mut j = i - 32;
        while j < i - 12 {
            x[j] += carry - 16 * x[i] * i64::from(L[j - (i - 32)]);
            carry = (x[j] + 128) >> 8;
            x[j] -= carry << 8;
            j += 1;
        }
        x[j] += carry;
        x[i] = 0;
    }
    let mut carry: i64 = 0;
    for j in 0..32 {
        x[j] += carry - (x[31] >> 4) * i64::from(L[j]);
        carry = x[j] >> 8;
        x[j] &= 255;
    }
    for j in 0..32 {
        x[j] -= carry * i64::from(L[j]);
    }
    for i in 0..32 {
        x[i + 1] += x[i] >> 8;
        r[i] = (x[i] & 255) as u8;
    }
}

/// SHA-512(R || A || M) reduced mod L: the `h` of the verification equation.
fn compute_challenge(r: &[u8; 32], a: &[u8; 32], msg: &[u8]) -> [u8; 32] {
    let mut hasher = Sha512::new();
    hasher.update(r);
    hasher.update(a);
    hasher.update(msg);
    let digest = hasher.finalize();

    let mut x = [0i64; 64];
    for (i, b) in digest.iter().enumerate() {
        x[i] = i64::from(*b);
    }
    let mut out = [0u8; 32];
    mod_l(&mut out, &mut x);
    out
}

/// Verify an Ed25519 signature.
///
/// Returns `Ok(false)` (never an error) for semantically invalid inputs:
/// small-order `A` or `R`, non-canonical `S`, undecodable points, or a
/// failed equation. Returns `Err` only for wrong input lengths via
/// [`verify_checked`].
pub fn verify(signature: &[u8; 64], public_key: &[u8; 32], message: &[u8], variant: Variant) -> bool {
    let mut r_bytes = [0u8; 32];
    let mut s_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&signature[..32]);
    s_bytes.copy_from_slice(&signature[32..]);

    if !scalar_is_canonical(&s_bytes) {
        return false;
    }
    if is_small_order(public_key) || is_small_order(&r_bytes) {
        return false;
    }

    let Some(mut neg_a) = point_unpack_neg(public_key) else {
        return false;
    };

    let h = compute_challenge(&r_bytes, public_key, message);

    // p = [h](-A) + [s]B = [s]B - [h]A
    let mut p = point_identity();
    let mut q = point_identity();
    point_scalar_mult(&mut p, &mut neg_a, &h);
    point_scalar_base(&mut q, &s_bytes);
    point_add(&mut p, &q);

    match variant {
        Variant::Cofactorless => {
            let mut packed = [0u8; 32];
            point_pack(&mut packed, &p);
            verify_32(&packed, &r_bytes)
        }
        Variant::Cofactored => {
            // q' = ([s]B - [h]A) - R, then [8]q' must be the identity.
            let Some(neg_r) = point_unpack_neg(&r_bytes) else {
                return false;
            };
            point_add(&mut p, &neg_r);
            for _ in 0..3 {
                let p_copy = p;
                point_add(&mut p, &p_copy);
            }
            let mut packed = [0u8; 32];
            point_pack(&mut packed, &p);
            verify_32(&packed, &IDENTITY)
        }
    }
}

/// Slice-validating entry point for [`verify`].
pub fn verify_checked(
    signature: &[u8],
    public_key: &[u8],
    message: &[u8],
    variant: Variant,
) -> Result<bool> {
    let sig: &[u8; 64] = signature.try_into().map_err(|_| Error::InvalidLength {
        kind: "signature",
        expected: 64,
        actual: signature.len(),
    })?;
    let pk: &[u8; 32] = public_key.try_into().map_err(|_| Error::InvalidLength {
        kind: "public key",
        expected: 32,
        actual: public_key.len(),
    })?;
    Ok(verify(sig, pk, message, variant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Signer;

    fn dalek_sign(msg: &[u8]) -> ([u8; 64], [u8; 32]) {
        let mut secret = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut secret);
        let key = ed25519_dalek::SigningKey::from_bytes(&secret);
        let sig = key.sign(msg);
        (sig.to_bytes(), key.verifying_key().to_bytes())
    }

    #[test]
    fn test_accepts_valid_signature_both_variants() {
        let msg = b"confidential calldata envelope";
        let (sig, pk) = dalek_sign(msg);
        assert!(verify(&sig, &pk, msg, Variant::Cofactorless));
        assert!(verify(&sig, &pk, msg, Variant::Cofactored));
    }

    #[test]
    fn test_rejects_wrong_message() {
        let (sig, pk) = dalek_sign(b"original");
        assert!(!verify(&sig, &pk, b"tampered", Variant::Cofactorless));
        assert!(!verify(&sig, &pk, b"tampered", Variant::Cofactored));
    }

    #[test]
    fn test_rejects_flipped_signature_bit() {
        let msg = b"bit flip";
        let (mut sig, pk) = dalek_sign(msg);
        sig[40] ^= 0x01;
        assert!(!verify(&sig, &pk, msg, Variant::Cofactorless));
    }

    #[test]
    fn test_rejects_small_order_public_key() {
        // y = 0 (order 4) and the identity (order 1) are both torsion points.
        let msg = b"m";
        let (sig, _) = dalek_sign(msg);
        let zero_pk = [0u8; 32];
        assert!(!verify(&sig, &zero_pk, msg, Variant::Cofactorless));
        assert!(!verify(&sig, &zero_pk, msg, Variant::Cofactored));

        let mut identity_pk = [0u8; 32];
        identity_pk[0] = 1;
        assert!(!verify(&sig, &identity_pk, msg, Variant::Cofactorless));
        assert!(!verify(&sig, &identity_pk, msg, Variant::Cofactored));
    }

    #[test]
    fn test_rejects_small_order_r_component() {
        let msg = b"m";
        let (mut sig, pk) = dalek_sign(msg);
        // Replace R with the identity encoding.
        sig[..32].copy_from_slice(&super::IDENTITY);
        assert!(!verify(&sig, &pk, msg, Variant::Cofactorless));
        assert!(!verify(&sig, &pk, msg, Variant::Cofactored));
    }

    #[test]
    fn test_rejects_non_canonical_scalar() {
        let msg = b"m";
        let (mut sig, pk) = dalek_sign(msg);
        // S = L is the smallest non-canonical scalar.
        sig[32..].copy_from_slice(&super::L);
        assert!(!verify(&sig, &pk, msg, Variant::Cofactorless));
        assert!(!verify(&sig, &pk, msg, Variant::Cofactored));
    }

    #[test]
    fn test_scalar_canonicity_boundary() {
        let mut just_below = super::L;
        just_below[0] -= 1;
        assert!(scalar_is_canonical(&just_below));
        assert!(!scalar_is_canonical(&super::L));
        let mut above = super::L;
        above[31] += 1;
        assert!(!scalar_is_canonical(&above));
    }

    #[test]
    fn test_checked_rejects_wrong_lengths() {
        let res = verify_checked(&[0u8; 63], &[0u8; 32], b"", Variant::Cofactorless);
        assert!(matches!(
            res.unwrap_err(),
            crate::Error::InvalidLength { kind: "signature", .. }
        ));
        let res = verify_checked(&[0u8; 64], &[0u8; 31], b"", Variant::Cofactored);
        assert!(matches!(
            res.unwrap_err(),
            crate::Error::InvalidLength { kind: "public key", .. }
        ));
    }
}
