//! Statistics composed from the primitive operations.
//!
//! Every public method takes and returns serialized ciphertexts. Inputs are
//! decoded up front, so a malformed blob anywhere in the input is reported as
//! [`Error::MalformedCiphertext`] before any arithmetic happens. Each
//! ciphertext product is relinearized (and rescaled under CKKS) before it is
//! used again.

use crate::ciphertext::Ciphertext;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::evaluator::{Evaluator, HomomorphicOps};
use crate::params::Scheme;
use tracing::debug;

/// Statistics over serialized ciphertexts. Holds no secret.
#[derive(Clone, Debug)]
pub struct StatisticsEngine {
    evaluator: Evaluator,
    codec: Codec,
}

impl StatisticsEngine {
    /// Engine over `evaluator`, with a codec for the same context.
    pub fn new(evaluator: Evaluator) -> Self {
        let codec = Codec::new(evaluator.context().clone());
        Self { evaluator, codec }
    }

    /// Underlying primitive evaluator.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Codec used at the byte boundary.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    fn decode(&self, bytes: &[u8]) -> Result<Ciphertext> {
        self.codec.deserialize(bytes)
    }

    fn decode_all<B: AsRef<[u8]>>(&self, xs: &[B]) -> Result<Vec<Ciphertext>> {
        xs.iter().map(|x| self.decode(x.as_ref())).collect()
    }

    fn encode(&self, ct: &Ciphertext) -> Vec<u8> {
        self.codec.serialize(ct)
    }

    // ------------------------------------------------------------
    // ciphertext-level compositions (inputs are non-empty)
    // ------------------------------------------------------------

    fn sum_of(&self, xs: &[Ciphertext]) -> Result<Ciphertext> {
        let ev = &self.evaluator;
        let first = xs.first().ok_or(Error::EmptyInput)?;
        // seeded with an encrypted zero, never with xs[0] itself
        let mut acc = ev.zero_like(first)?;
        for x in xs {
            ev.add_assign(&mut acc, x)?;
        }
        Ok(acc)
    }

    fn mean_of(&self, xs: &[Ciphertext]) -> Result<Ciphertext> {
        let total = self.sum_of(xs)?;
        self.evaluator.mul_const(&total, 1.0 / xs.len() as f64)
    }

    /// Σ (x_i − mx)(y_i − my) / N. With `ys == None` the deviations of `xs` are squared.
    fn co_moment(&self, xs: &[Ciphertext], ys: Option<&[Ciphertext]>) -> Result<Ciphertext> {
        let ev = &self.evaluator;
        let mx = self.mean_of(xs)?;
        let my = match ys {
            Some(ys) => Some(self.mean_of(ys)?),
            None => None,
        };
        let mut acc = ev.zero_like(&xs[0])?;
        for (i, x) in xs.iter().enumerate() {
            let dx = ev.sub(x, &mx)?;
            let term = match (ys, &my) {
                (Some(ys), Some(my)) => ev.product(&dx, &ev.sub(&ys[i], my)?)?,
                _ => ev.product(&dx, &dx)?,
            };
            ev.add_assign(&mut acc, &term)?;
        }
        ev.mul_const(&acc, 1.0 / xs.len() as f64)
    }

    fn element_n_of(&self, first: &Ciphertext, diff: &Ciphertext, n: &Ciphertext) -> Result<Ciphertext> {
        let ev = &self.evaluator;
        let n_minus_one = ev.add_const(n, -1.0)?;
        let step = ev.product(diff, &n_minus_one)?;
        ev.add(first, &step)
    }

    fn inverse_of(&self, x: &Ciphertext, iterations: usize, initial: f64) -> Result<Ciphertext> {
        let ev = &self.evaluator;
        if ev.scheme() == Scheme::Exact {
            return Err(Error::Unsupported(
                "reciprocals need the approximate scheme".into(),
            ));
        }
        let mut xn = ev.add_const(&ev.zero_like(x)?, initial)?;
        for _ in 0..iterations {
            // x_{n+1} = x_n·(2 − x·x_n)
            let cx = ev.product(x, &xn)?;
            let correction = ev.negate(&ev.add_const(&cx, -2.0)?)?;
            xn = ev.product(&xn, &correction)?;
        }
        Ok(xn)
    }

    // ------------------------------------------------------------
    // aggregates
    // ------------------------------------------------------------

    /// Homomorphic sum of `xs`.
    pub fn sum<B: AsRef<[u8]>>(&self, xs: &[B]) -> Result<Vec<u8>> {
        if xs.is_empty() {
            return Err(Error::EmptyInput);
        }
        let xs = self.decode_all(xs)?;
        debug!(len = xs.len(), "sum");
        Ok(self.encode(&self.sum_of(&xs)?))
    }

    /// `sum / N`. Under the exact scheme only a single element is accepted.
    pub fn mean<B: AsRef<[u8]>>(&self, xs: &[B]) -> Result<Vec<u8>> {
        if xs.is_empty() {
            return Err(Error::EmptyInput);
        }
        let xs = self.decode_all(xs)?;
        debug!(len = xs.len(), "mean");
        Ok(self.encode(&self.mean_of(&xs)?))
    }

    /// Mean of every full window of `window` consecutive elements.
    /// A window at least as long as the input yields no output.
    pub fn moving_average<B: AsRef<[u8]>>(&self, xs: &[B], window: usize) -> Result<Vec<Vec<u8>>> {
        if xs.is_empty() || window == 0 {
            return Err(Error::EmptyInput);
        }
        let xs = self.decode_all(xs)?;
        debug!(len = xs.len(), window, "moving average");
        if window >= xs.len() {
            return Ok(Vec::new());
        }
        xs.windows(window)
            .map(|w| self.mean_of(w).map(|m| self.encode(&m)))
            .collect()
    }

    /// Population variance (divides by N).
    pub fn variance<B: AsRef<[u8]>>(&self, xs: &[B]) -> Result<Vec<u8>> {
        if xs.is_empty() {
            return Err(Error::EmptyInput);
        }
        let xs = self.decode_all(xs)?;
        debug!(len = xs.len(), "variance");
        Ok(self.encode(&self.co_moment(&xs, None)?))
    }

    /// Population covariance (divides by N).
    pub fn covariance<B: AsRef<[u8]>>(&self, xs: &[B], ys: &[B]) -> Result<Vec<u8>> {
        if xs.len() != ys.len() {
            return Err(Error::LengthMismatch {
                left: xs.len(),
                right: ys.len(),
            });
        }
        if xs.is_empty() {
            return Err(Error::EmptyInput);
        }
        let xs = self.decode_all(xs)?;
        let ys = self.decode_all(ys)?;
        debug!(len = xs.len(), "covariance");
        Ok(self.encode(&self.co_moment(&xs, Some(ys.as_slice()))?))
    }

    // ------------------------------------------------------------
    // arithmetic progressions
    // ------------------------------------------------------------

    /// `first + diff·(n − 1)`.
    pub fn arithmetic_progression_element_n(
        &self,
        first: &[u8],
        diff: &[u8],
        n: &[u8],
    ) -> Result<Vec<u8>> {
        let (first, diff, n) = (self.decode(first)?, self.decode(diff)?, self.decode(n)?);
        debug!("arithmetic progression element");
        Ok(self.encode(&self.element_n_of(&first, &diff, &n)?))
    }

    /// `n·(first + element_n) / 2`.
    pub fn arithmetic_progression_sum(&self, first: &[u8], diff: &[u8], n: &[u8]) -> Result<Vec<u8>> {
        let ev = &self.evaluator;
        let (first, diff, n) = (self.decode(first)?, self.decode(diff)?, self.decode(n)?);
        debug!("arithmetic progression sum");
        let last = self.element_n_of(&first, &diff, &n)?;
        let ends = ev.add(&first, &last)?;
        let total = ev.product(&n, &ends)?;
        // n·(first + last) is always even
        Ok(self.encode(&ev.div_exact(&total, 2)?))
    }

    // ------------------------------------------------------------
    // division
    // ------------------------------------------------------------

    /// Newton–Raphson reciprocal with a fixed number of iterations.
    ///
    /// Nothing checks convergence: the caller picks `initial_approximation`
    /// in `(0, 2/x)` for the expected range of `x` and enough `iterations`.
    /// Each iteration spends two levels.
    pub fn inverse(&self, x: &[u8], iterations: usize, initial_approximation: f64) -> Result<Vec<u8>> {
        let x = self.decode(x)?;
        debug!(iterations, initial_approximation, "inverse");
        Ok(self.encode(&self.inverse_of(&x, iterations, initial_approximation)?))
    }

    /// `a · inverse(b)`; same preconditions as [`StatisticsEngine::inverse`].
    pub fn divide(
        &self,
        a: &[u8],
        b: &[u8],
        iterations: usize,
        initial_approximation: f64,
    ) -> Result<Vec<u8>> {
        let (a, b) = (self.decode(a)?, self.decode(b)?);
        debug!(iterations, initial_approximation, "divide");
        let inv = self.inverse_of(&b, iterations, initial_approximation)?;
        Ok(self.encode(&self.evaluator.product(&a, &inv)?))
    }

    /// Under the exact scheme only `±1` are accepted; other divisors are
    /// `Unsupported` since the quotient may not be an integer.
    pub fn div_const(&self, x: &[u8], divisor: f64) -> Result<Vec<u8>> {
        let x = self.decode(x)?;
        Ok(self.encode(&self.evaluator.div_const(&x, divisor)?))
    }

    // ------------------------------------------------------------
    // binary and constant operations
    // ------------------------------------------------------------

    /// `a + b`.
    pub fn add(&self, a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
        let (a, b) = (self.decode(a)?, self.decode(b)?);
        Ok(self.encode(&self.evaluator.add(&a, &b)?))
    }

    /// `a - b`.
    pub fn subtract(&self, a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
        let (a, b) = (self.decode(a)?, self.decode(b)?);
        Ok(self.encode(&self.evaluator.sub(&a, &b)?))
    }

    /// Relinearized (and rescaled) product.
    pub fn multiply(&self, a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
        let (a, b) = (self.decode(a)?, self.decode(b)?);
        Ok(self.encode(&self.evaluator.product(&a, &b)?))
    }

    /// `x·x`, relinearized like [`StatisticsEngine::multiply`].
    pub fn square(&self, x: &[u8]) -> Result<Vec<u8>> {
        let x = self.decode(x)?;
        Ok(self.encode(&self.evaluator.product(&x, &x)?))
    }

    /// `x + k`.
    pub fn add_const(&self, x: &[u8], k: f64) -> Result<Vec<u8>> {
        let x = self.decode(x)?;
        Ok(self.encode(&self.evaluator.add_const(&x, k)?))
    }

    /// `x - k`.
    pub fn sub_const(&self, x: &[u8], k: f64) -> Result<Vec<u8>> {
        self.add_const(x, -k)
    }

    /// `x·k`; see [`HomomorphicOps::mul_const`] for the level cost.
    pub fn mul_const(&self, x: &[u8], k: f64) -> Result<Vec<u8>> {
        let x = self.decode(x)?;
        Ok(self.encode(&self.evaluator.mul_const(&x, k)?))
    }
}
