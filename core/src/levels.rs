//! Essential/guard level mapping: a bijection between
//! full indices `i in [0,N)` and essential indices `i_ess in [0,N_ess)`,
//! where essential levels are the leading `nessential_q` of each
//! oscillator's `nlevels_q`. Guard indices (at least one oscillator index
//! at or above its `nessential_q`) map to `None` under full->essential.

/// Precomputed bijection for a fixed tuple of oscillator level counts.
#[derive(Debug, Clone)]
pub struct EssentialMap {
    nlevels: Vec<usize>,
    nessential: Vec<usize>,
    full_to_ess: Vec<Option<usize>>,
    ess_to_full: Vec<usize>,
}

impl EssentialMap {
    /// Build the map for oscillators with `nlevels[q]` total levels and
    /// `nessential[q] <= nlevels[q]` essential (computational-subspace)
    /// levels.
    pub fn new(nlevels: &[usize], nessential: &[usize]) -> Self {
        assert_eq!(nlevels.len(), nessential.len());
        let n_full: usize = nlevels.iter().product();
        let mut full_to_ess = vec![None; n_full];
        let mut ess_to_full = Vec::new();

        for full_idx in 0..n_full {
            let digits = Self::decompose(full_idx, nlevels);
            let is_essential = digits.iter().zip(nessential.iter()).all(|(d, ne)| d < ne);
            if is_essential {
                let ess_idx = Self::compose(&digits, nessential);
                full_to_ess[full_idx] = Some(ess_idx);
                if ess_idx >= ess_to_full.len() {
                    ess_to_full.resize(ess_idx + 1, 0);
                }
                ess_to_full[ess_idx] = full_idx;
            }
        }

        Self {
            nlevels: nlevels.to_vec(),
            nessential: nessential.to_vec(),
            full_to_ess,
            ess_to_full,
        }
    }

    /// Mixed-radix decomposition of a flat index into per-oscillator digits,
    /// most significant oscillator (index 0) varying slowest.
    fn decompose(mut flat: usize, radices: &[usize]) -> Vec<usize> {
        let mut digits = vec![0; radices.len()];
        for q in (0..radices.len()).rev() {
            digits[q] = flat % radices[q];
            flat /= radices[q];
        }
        digits
    }

    fn compose(digits: &[usize], radices: &[usize]) -> usize {
        let mut flat = 0;
        for q in 0..radices.len() {
            flat = flat * radices[q] + digits[q];
        }
        flat
    }

    pub fn n_full(&self) -> usize {
        self.nlevels.iter().product()
    }

    pub fn n_essential(&self) -> usize {
        self.nessential.iter().product()
    }

    /// Essential index for `full_idx`, or `None` if it is a guard level.
    pub fn full_to_essential(&self, full_idx: usize) -> Option<usize> {
        self.full_to_ess[full_idx]
    }

    /// Full-space index corresponding to essential index `ess_idx`.
    pub fn essential_to_full(&self, ess_idx: usize) -> usize {
        self.ess_to_full[ess_idx]
    }

    /// True if `full_idx` is a guard (leakage) index for any oscillator.
    pub fn is_guard(&self, full_idx: usize) -> bool {
        self.full_to_ess[full_idx].is_none()
    }

    pub fn nlevels(&self) -> &[usize] {
        &self.nlevels
    }

    pub fn nessential(&self) -> &[usize] {
        &self.nessential
    }
}
