//! Constant-time comparison of secrets.

use subtle::ConstantTimeEq;

/// Compare two secrets without leaking where they differ.
///
/// Running time depends only on the input lengths, never on the position of
/// the first mismatching byte. Strings of different length compare unequal
/// immediately; lengths of tokens and tags are not secret.
pub fn secure_compare(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
