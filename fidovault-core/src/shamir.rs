//! K-of-N secret sharing over GF(256).
//!
//! Secrets of any length are split byte-wise. Every share is as long as the
//! secret and is tagged with a non-zero x-coordinate carried *next to* the
//! share bytes (the vault persists it as a JSON map key), never embedded in
//! them. Combining Lagrange-interpolates each byte position at x = 0.

use std::collections::BTreeMap;

use sharks::{Share, Sharks};

use crate::error::{Error, Result};

/// Structural minimum for any combine: one point never determines a line.
pub const MIN_SHARES: usize = 2;

/// Splits `secret` into `n` shares, any `k` of which recover it.
///
/// Shares are indexed `1..=n` and each is `secret.len()` bytes.
///
/// # Errors
///
/// Fails with [`Error::ThresholdOutOfRange`] unless `2 <= k <= n`.
pub fn split(secret: &[u8], k: u8, n: u8) -> Result<BTreeMap<u8, Vec<u8>>> {
    if k < 2 || n < k {
        return Err(Error::ThresholdOutOfRange { k, n });
    }

    let mut shares = BTreeMap::new();
    for share in Sharks(k).dealer(secret).take(usize::from(n)) {
        let bytes = Vec::from(&share);
        // The dealer hands out x-coordinates 1..=n in order.
        shares.insert(bytes[0], bytes[1..].to_vec());
    }
    debug_assert_eq!(shares.len(), usize::from(n));
    Ok(shares)
}

/// Recombines tagged `(index, share)` pairs into the secret.
///
/// Any `k` of the original shares reconstruct the secret exactly; fewer
/// well-formed shares interpolate to an unrelated value, which is not
/// detectable here.
///
/// # Errors
///
/// Fails with [`Error::InsufficientShares`] below the structural minimum of
/// two, [`Error::InvalidShareIndex`] on index 0, [`Error::DuplicateIndex`]
/// when two shares carry the same x, and [`Error::ShareLength`] when the
/// share lengths disagree.
pub fn combine(shares: &[(u8, Vec<u8>)]) -> Result<Vec<u8>> {
    if shares.len() < MIN_SHARES {
        return Err(Error::InsufficientShares {
            provided: shares.len(),
            required: MIN_SHARES,
        });
    }

    let expected = shares[0].1.len();
    let mut seen = [false; 256];
    let mut parsed = Vec::with_capacity(shares.len());
    for (index, data) in shares {
        if *index == 0 {
            return Err(Error::InvalidShareIndex(0));
        }
        if seen[usize::from(*index)] {
            return Err(Error::DuplicateIndex(*index));
        }
        seen[usize::from(*index)] = true;

        if data.len() != expected {
            return Err(Error::ShareLength {
                expected,
                found: data.len(),
            });
        }

        let mut raw = Vec::with_capacity(1 + data.len());
        raw.push(*index);
        raw.extend_from_slice(data);
        let share = Share::try_from(raw.as_slice())
            .map_err(|e| Error::Crypto(format!("malformed share: {e}")))?;
        parsed.push(share);
    }

    // The interpolation itself has no notion of k; only the structural
    // minimum is enforced at this layer.
    Sharks(MIN_SHARES as u8)
        .recover(&parsed)
        .map_err(|e| Error::Crypto(format!("share recovery failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(shares: &BTreeMap<u8, Vec<u8>>, indices: &[u8]) -> Vec<(u8, Vec<u8>)> {
        indices
            .iter()
            .map(|i| (*i, shares[i].clone()))
            .collect()
    }

    #[test]
    fn split_indices_run_one_to_n() {
        let shares = split(b"secret material", 2, 5).unwrap();
        assert_eq!(shares.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(shares.values().all(|s| s.len() == 15));
    }

    #[test]
    fn any_k_subset_recovers_2_of_3() {
        let secret = b"\x00\x01\xfe\xff tagged share secret";
        let shares = split(secret, 2, 3).unwrap();

        for subset in [[1u8, 2], [1, 3], [2, 3]] {
            let recovered = combine(&pairs(&shares, &subset)).unwrap();
            assert_eq!(recovered, secret, "subset {subset:?}");
        }
    }

    #[test]
    fn any_k_subset_recovers_3_of_5() {
        let secret: Vec<u8> = (0..64).collect();
        let shares = split(&secret, 3, 5).unwrap();

        for subset in [[1u8, 2, 3], [1, 3, 5], [2, 4, 5], [3, 4, 5]] {
            let recovered = combine(&pairs(&shares, &subset)).unwrap();
            assert_eq!(recovered, secret, "subset {subset:?}");
        }
    }

    #[test]
    fn more_than_k_shares_still_recover() {
        let secret = b"over-threshold";
        let shares = split(secret, 2, 4).unwrap();
        let recovered = combine(&pairs(&shares, &[1, 2, 3, 4])).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn below_structural_minimum_fails() {
        let shares = split(b"secret", 2, 3).unwrap();
        assert!(matches!(
            combine(&pairs(&shares, &[1])),
            Err(Error::InsufficientShares { provided: 1, required: 2 })
        ));
        assert!(matches!(
            combine(&[]),
            Err(Error::InsufficientShares { provided: 0, .. })
        ));
    }

    #[test]
    fn fewer_than_k_shares_recover_garbage() {
        let secret = {
            let mut buf = vec![0u8; 32];
            getrandom::getrandom(&mut buf).unwrap();
            buf
        };
        let shares = split(&secret, 3, 5).unwrap();

        // Two well-formed shares of a k=3 split interpolate *something*,
        // just not the secret.
        let wrong = combine(&pairs(&shares, &[1, 2])).unwrap();
        assert_ne!(wrong, secret);
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let shares = split(b"secret", 2, 3).unwrap();
        let doubled = vec![
            (1, shares[&1].clone()),
            (1, shares[&1].clone()),
            (2, shares[&2].clone()),
        ];
        assert!(matches!(combine(&doubled), Err(Error::DuplicateIndex(1))));
    }

    #[test]
    fn zero_index_is_rejected() {
        let shares = split(b"secret", 2, 3).unwrap();
        let with_zero = vec![(0, shares[&1].clone()), (2, shares[&2].clone())];
        assert!(matches!(combine(&with_zero), Err(Error::InvalidShareIndex(0))));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let shares = split(b"secret", 2, 3).unwrap();
        let mut short = shares[&2].clone();
        short.pop();
        let uneven = vec![(1, shares[&1].clone()), (2, short)];
        assert!(matches!(
            combine(&uneven),
            Err(Error::ShareLength { expected: 6, found: 5 })
        ));
    }

    #[test]
    fn threshold_bounds_are_enforced() {
        assert!(matches!(
            split(b"secret", 1, 3),
            Err(Error::ThresholdOutOfRange { k: 1, n: 3 })
        ));
        assert!(matches!(
            split(b"secret", 0, 0),
            Err(Error::ThresholdOutOfRange { .. })
        ));
        assert!(matches!(
            split(b"secret", 4, 3),
            Err(Error::ThresholdOutOfRange { k: 4, n: 3 })
        ));
        // Degenerate but legal: k == n.
        assert!(split(b"secret", 3, 3).is_ok());
    }

    #[test]
    fn max_n_split_recovers() {
        let secret = b"all the way to 255";
        let shares = split(secret, 2, 255).unwrap();
        assert_eq!(shares.len(), 255);
        let recovered = combine(&pairs(&shares, &[17, 255])).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn single_byte_secret_roundtrips() {
        let shares = split(b"\x5a", 2, 2).unwrap();
        let recovered = combine(&pairs(&shares, &[1, 2])).unwrap();
        assert_eq!(recovered, b"\x5a");
    }
}
