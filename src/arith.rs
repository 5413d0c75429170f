//! 64-bit modular arithmetic and prime search.

// ------------------------------------------------------------
// basic ops (operands are always reduced: a, b < q)
// ------------------------------------------------------------
/// (a + b) mod q for a, b < q.
#[inline]
pub fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let s = a as u128 + b as u128;
    if s >= q as u128 {
        (s - q as u128) as u64
    } else {
        s as u64
    }
}

/// (a - b) mod q for a, b < q.
#[inline]
pub fn sub_mod(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        q - (b - a)
    }
}

/// -a mod q.
#[inline]
pub fn neg_mod(a: u64, q: u64) -> u64 {
    if a == 0 {
        0
    } else {
        q - a
    }
}

/// a·b mod q through a u128 product.
#[inline]
pub fn mul_mod(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

/// Square-and-multiply exponentiation.
pub fn pow_mod(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut res = 1u64 % q;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            res = mul_mod(res, base, q);
        }
        base = mul_mod(base, base, q);
        exp >>= 1;
    }
    res
}

/// a⁻¹ mod q via extended Euclid. `None` when gcd(a, q) ≠ 1.
pub fn inv_mod(a: u64, q: u64) -> Option<u64> {
    let (mut t, mut new_t) = (0i128, 1i128);
    let (mut r, mut new_r) = (q as i128, (a % q) as i128);
    while new_r != 0 {
        let quotient = r / new_r;
        t -= quotient * new_t;
        r -= quotient * new_r;
        std::mem::swap(&mut t, &mut new_t);
        std::mem::swap(&mut r, &mut new_r);
    }
    if r != 1 {
        return None;
    }
    if t < 0 {
        t += q as i128;
    }
    Some(t as u64)
}

/// Reduces a signed value into [0, q).
#[inline]
pub fn reduce_i128(x: i128, q: u64) -> u64 {
    x.rem_euclid(q as i128) as u64
}

/// Maps a residue to its representative in (-q/2, q/2].
#[inline]
pub fn center(x: u64, q: u64) -> i64 {
    if x > q / 2 {
        -((q - x) as i64)
    } else {
        x as i64
    }
}

/// Number of significant bits; 0 for 0.
#[inline]
pub fn bit_len(x: u64) -> u32 {
    64 - x.leading_zeros()
}

// ------------------------------------------------------------
// primality
// ------------------------------------------------------------

/// Deterministic Miller–Rabin for the whole u64 range.
pub fn is_prime(n: u64) -> bool {
    const BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &p in &BASES {
        if n % p == 0 {
            return n == p;
        }
    }
    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }
    'witness: for &a in &BASES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// `count` primes q ≡ 1 (mod `step`) strictly below 2^bits, largest first,
/// skipping anything listed in `exclude`.
pub fn primes_below(bits: u32, step: u64, count: usize, exclude: &[u64]) -> Vec<u64> {
    let top = 1u64 << bits;
    let mut out = Vec::with_capacity(count);
    let mut cand = top - (top % step) + 1;
    while cand >= top {
        cand -= step;
    }
    while out.len() < count && cand > step {
        if is_prime(cand) && !exclude.contains(&cand) {
            out.push(cand);
        }
        cand -= step;
    }
    out
}

/// `count` primes q ≡ 1 (mod `step`) ordered by distance to 2^bits, so that
/// rescaling by any of them leaves a scale of 2^bits almost untouched.
pub fn primes_near(bits: u32, step: u64, count: usize, exclude: &[u64]) -> Vec<u64> {
    let center = (1u64 << bits) + 1;
    let mut out = Vec::with_capacity(count);
    let mut j = 0u64;
    while out.len() < count {
        let up = center + j * step;
        if is_prime(up) && !exclude.contains(&up) && !out.contains(&up) {
            out.push(up);
        }
        if j > 0 && out.len() < count && center > j * step {
            let down = center - j * step;
            if is_prime(down) && !exclude.contains(&down) && !out.contains(&down) {
                out.push(down);
            }
        }
        j += 1;
    }
    out
}

/// Primitive 2n-th root of unity mod q (q ≡ 1 mod 2n, n a power of two).
pub fn primitive_2nth_root(n: usize, q: u64) -> u64 {
    let two_n = 2 * n as u64;
    debug_assert_eq!((q - 1) % two_n, 0);
    // psi = x^((q-1)/2n) for a non-residue x has psi^n = -1, hence order 2n
    let mut x = 2u64;
    loop {
        if pow_mod(x, (q - 1) / 2, q) == q - 1 {
            return pow_mod(x, (q - 1) / two_n, q);
        }
        x += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_and_pow() {
        let q = 65537;
        for a in [1u64, 2, 3, 12345, 65536] {
            let inv = inv_mod(a, q).unwrap();
            assert_eq!(mul_mod(a, inv, q), 1);
        }
        assert_eq!(inv_mod(6, 9), None);
        assert_eq!(pow_mod(3, 0, 7), 1);
        assert_eq!(pow_mod(3, 6, 7), 1);
    }

    #[test]
    fn test_is_prime() {
        let primes = [2u64, 3, 65537, 1_099_511_627_791, 1_152_921_504_606_846_883];
        for p in primes {
            assert!(is_prime(p), "{p} should be prime");
        }
        for c in [0u64, 1, 4, 65535, 3_215_031_751, 1_152_921_504_606_846_975] {
            assert!(!is_prime(c), "{c} should be composite");
        }
    }

    #[test]
    fn test_prime_search() {
        let step = 2048;
        let below = primes_below(60, step, 3, &[]);
        assert_eq!(below.len(), 3);
        assert!(below.windows(2).all(|w| w[0] > w[1]));
        for q in &below {
            assert!(*q < 1 << 60);
            assert_eq!(q % step, 1);
        }

        let near = primes_near(40, step, 4, &below);
        for q in &near {
            assert_eq!(q % step, 1);
            let rel = (*q as f64 / (1u64 << 40) as f64 - 1.0).abs();
            assert!(rel < 1e-4, "prime {q} too far from 2^40");
        }
    }

    #[test]
    fn test_primitive_root() {
        let q = primes_below(40, 16, 1, &[])[0];
        let psi = primitive_2nth_root(8, q);
        assert_eq!(pow_mod(psi, 8, q), q - 1);
        assert_eq!(pow_mod(psi, 16, q), 1);
    }

    #[test]
    fn test_center() {
        assert_eq!(center(3, 17), 3);
        assert_eq!(center(16, 17), -1);
        assert_eq!(reduce_i128(-1, 17), 16);
    }
}
