//! Negacyclic number-theoretic transform over a single prime.
//!
//! Products in `Z_q[X]/(X^N+1)` are computed by twisting with powers of a
//! primitive 2N-th root ψ, running a cyclic transform with ω = ψ², and
//! multiplying pointwise.

use crate::arith::{add_mod, mul_mod, pow_mod, primitive_2nth_root, sub_mod};

/// Precomputed powers for one prime and ring degree.
#[derive(Clone, Debug)]
pub struct NttTable {
    q: u64,
    n: usize,
    psi_pows: Vec<u64>,
    psi_inv_pows: Vec<u64>,
    /// ω^j for j < N/2
    omega_pows: Vec<u64>,
    omega_inv_pows: Vec<u64>,
    n_inv: u64,
}

impl NttTable {
    /// `q` must be a prime with q ≡ 1 (mod 2n), `n` a power of two.
    pub fn new(q: u64, n: usize) -> Self {
        assert!(n.is_power_of_two(), "ring degree must be a power of two");
        assert_eq!((q - 1) % (2 * n as u64), 0, "q is not NTT-friendly for n");

        let psi = primitive_2nth_root(n, q);
        let psi_inv = pow_mod(psi, q - 2, q);
        let omega = mul_mod(psi, psi, q);
        let omega_inv = mul_mod(psi_inv, psi_inv, q);

        let powers = |base: u64, len: usize| -> Vec<u64> {
            let mut v = Vec::with_capacity(len);
            let mut acc = 1u64;
            for _ in 0..len {
                v.push(acc);
                acc = mul_mod(acc, base, q);
            }
            v
        };

        Self {
            q,
            n,
            psi_pows: powers(psi, n),
            psi_inv_pows: powers(psi_inv, n),
            omega_pows: powers(omega, n / 2),
            omega_inv_pows: powers(omega_inv, n / 2),
            n_inv: pow_mod(n as u64, q - 2, q),
        }
    }

    /// The prime q.
    #[inline]
    pub fn modulus(&self) -> u64 {
        self.q
    }

    /// Ring degree N.
    #[inline]
    pub fn degree(&self) -> usize {
        self.n
    }

    /// In-place forward transform (coefficient → evaluation form).
    pub fn forward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.n);
        for (x, &p) in a.iter_mut().zip(&self.psi_pows) {
            *x = mul_mod(*x, p, self.q);
        }
        self.cyclic(a, &self.omega_pows);
    }

    /// In-place inverse transform (evaluation → coefficient form).
    pub fn inverse(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.n);
        self.cyclic(a, &self.omega_inv_pows);
        for (x, &p) in a.iter_mut().zip(&self.psi_inv_pows) {
            *x = mul_mod(mul_mod(*x, self.n_inv, self.q), p, self.q);
        }
    }

    fn cyclic(&self, a: &mut [u64], roots: &[u64]) {
        let n = self.n;
        let q = self.q;
        bit_reverse(a);

        let mut len = 2;
        while len <= n {
            let stride = n / len;
            for i in (0..n).step_by(len) {
                for j in 0..len / 2 {
                    let w = roots[j * stride];
                    let u = a[i + j];
                    let v = mul_mod(a[i + j + len / 2], w, q);
                    a[i + j] = add_mod(u, v, q);
                    a[i + j + len / 2] = sub_mod(u, v, q);
                }
            }
            len <<= 1;
        }
    }

    /// Negacyclic product of two coefficient vectors.
    pub fn multiply(&self, a: &[u64], b: &[u64]) -> Vec<u64> {
        let mut fa = a.to_vec();
        let mut fb = b.to_vec();
        self.forward(&mut fa);
        self.forward(&mut fb);
        for (x, y) in fa.iter_mut().zip(&fb) {
            *x = mul_mod(*x, *y, self.q);
        }
        self.inverse(&mut fa);
        fa
    }
}

fn bit_reverse(vec: &mut [u64]) {
    let n = vec.len();
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            vec.swap(i, j);
        }
    }
}
