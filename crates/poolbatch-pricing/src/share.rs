//! Pro-rata splitting of a settled amount across a batch.

/// `floor(part × total / whole)`, computed in `u128`. Zero when `whole` is zero.
#[must_use]
pub fn pro_rata_share(part: u64, whole: u64, total: u64) -> u64 {
    if whole == 0 {
        return 0;
    }
    let share = u128::from(part) * u128::from(total) / u128::from(whole);
    // part <= whole keeps share <= total; clamp in case a caller passes more.
    u64::try_from(share).unwrap_or(u64::MAX)
}
