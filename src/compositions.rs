/// Lazy enumeration of the integer compositions of `total` into `parts` non-negative parts
///
/// Compositions come in reverse-lexicographic order: the first one puts everything into part 0,
/// the last one everything into the last part. The iterator is `Clone`, so a search can restart
/// the sequence or run it twice without recomputation on the caller's side.
#[derive(Debug, Clone)]
pub struct Compositions {
    current: Option<Vec<u32>>,
}

impl Compositions {
    pub fn new(total: u32, parts: usize) -> Self {
        let current = if parts == 0 {
            // The empty composition only sums to zero
            if total == 0 { Some(Vec::new()) } else { None }
        } else {
            let mut first = vec![0; parts];
            first[0] = total;
            Some(first)
        };
        Self { current }
    }

    /// Number of compositions, C(total + parts - 1, parts - 1), saturating at `u64::MAX`
    pub fn total_count(total: u32, parts: usize) -> u64 {
        if parts == 0 {
            return if total == 0 { 1 } else { 0 };
        }
        let m = total as u128 + parts as u128 - 1;
        let r = (parts as u128 - 1).min(total as u128);
        let mut result: u128 = 1;
        for i in 1..=r {
            result = match result.checked_mul(m - r + i) {
                Some(v) => v / i,
                None => return u64::MAX,
            };
            if result > u64::MAX as u128 {
                return u64::MAX;
            }
        }
        result as u64
    }

    /// Step to the next composition in reverse-lexicographic order
    fn advance(current: &mut [u32]) -> bool {
        let k = current.len();
        if k < 2 {
            return false;
        }
        // Rightmost position, excluding the last, that can give one unit to its right
        let Some(i) = current[..k - 1].iter().rposition(|&v| v > 0) else {
            return false;
        };
        let tail: u32 = current[i + 1..].iter().sum();
        current[i] -= 1;
        current[i + 1] = tail + 1;
        for v in &mut current[i + 2..] {
            *v = 0;
        }
        true
    }
}

impl Iterator for Compositions {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Vec<u32>> {
        let current = self.current.as_mut()?;
        let item = current.clone();
        if !Self::advance(current) {
            self.current = None;
        }
        Some(item)
    }
}
