//! Where encrypted samples come from.

use crate::custody::{Encryptor, Scalar};
use crate::error::Result;
use std::collections::BTreeMap;

/// Named columns of serialized ciphertexts.
pub trait CiphertextSource {
    /// Every ciphertext stored under `name`, in insertion order. An unknown
    /// column reads as empty.
    fn column(&self, name: &str) -> Result<Vec<Vec<u8>>>;
}

/// In-memory [`CiphertextSource`].
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    columns: BTreeMap<String, Vec<Vec<u8>>>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one serialized ciphertext to `name`.
    pub fn push(&mut self, name: &str, ciphertext: Vec<u8>) {
        self.columns.entry(name.to_owned()).or_default().push(ciphertext);
    }

    /// Encrypts `values` and appends them to `name`.
    pub fn encrypt_column(
        &mut self,
        encryptor: &Encryptor,
        name: &str,
        values: &[Scalar],
    ) -> Result<()> {
        for &v in values {
            let ct = encryptor.encrypt_bytes(v)?;
            self.push(name, ct);
        }
        Ok(())
    }

    /// Column names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

impl CiphertextSource for MemorySource {
    fn column(&self, name: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self.columns.get(name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::exact;

    #[test]
    fn test_columns_keep_order() {
        let fx = exact();
        let mut src = MemorySource::new();
        let values = [3, 1, 4].map(Scalar::Integer);
        src.encrypt_column(&fx.encryptor, "salary", &values).unwrap();

        let col = src.column("salary").unwrap();
        let got: Vec<f64> = col.iter().map(|b| fx.decrypt_bytes(b)).collect();
        assert_eq!(got, vec![3.0, 1.0, 4.0]);
        assert_eq!(src.names().collect::<Vec<_>>(), vec!["salary"]);
    }

    #[test]
    fn test_unknown_column_is_empty() {
        let fx = exact();
        let src = MemorySource::new();
        let col = src.column("missing").unwrap();
        assert!(col.is_empty());
        assert_eq!(fx.engine.sum(&col).unwrap_err(), Error::EmptyInput);
    }
}
