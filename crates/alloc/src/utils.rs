//! Size and alignment helpers shared by arenas and pool files

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use pmbench_alloc::utils::align_up;
/// assert_eq!(align_up(17, 16), 32);
/// assert_eq!(align_up(64, 64), 64);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Overflow-checked variant of [`align_up`]
#[inline(always)]
pub const fn checked_align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    match value.checked_add(alignment - 1) {
        Some(v) => Some(v & !(alignment - 1)),
        None => None,
    }
}

/// Aligns a value down to the nearest multiple of alignment
#[inline(always)]
pub const fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}

/// Parses a byte count such as `4096`, `64K`, `16MiB` or `2G`
///
/// Suffixes are binary multiples and case-insensitive; surrounding
/// whitespace is ignored. Returns `None` on malformed input or overflow.
pub fn parse_size(input: &str) -> Option<usize> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit() && c != '_')
        .unwrap_or(input.len());
    let (digits, suffix) = input.split_at(split);

    let digits: String = digits.chars().filter(|c| *c != '_').collect();
    if digits.is_empty() {
        return None;
    }
    let value: usize = digits.parse().ok()?;

    let shift = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        _ => return None,
    };

    value.checked_mul(1usize << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_down(127, 64), 64);
        assert_eq!(checked_align_up(usize::MAX, 64), None);
        assert_eq!(checked_align_up(100, 16), Some(112));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size(" 64K "), Some(64 * 1024));
        assert_eq!(parse_size("16MiB"), Some(16 * 1024 * 1024));
        assert_eq!(parse_size("2g"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("1_048_576"), Some(1 << 20));
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("M"), None);
        assert_eq!(parse_size("12 parsecs"), None);
        assert_eq!(parse_size("-5"), None);
        assert_eq!(parse_size(&format!("{}G", usize::MAX)), None);
    }
}
