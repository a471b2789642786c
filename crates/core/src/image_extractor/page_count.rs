/// Estimates a page count from file size when the caller hasn't parsed the
/// document yet (§4.2): classifies by size-in-KB bracket, caps at 500,
/// floors at 1.
pub fn estimate_page_count(file_size_bytes: u64) -> u32 {
    let kb = file_size_bytes as f64 / 1024.0;

    let estimate = if kb < 500.0 {
        (kb / 50.0).ceil()
    } else if kb < 5000.0 {
        (kb / 150.0).ceil()
    } else {
        (kb / 300.0).ceil()
    };

    (estimate as u32).clamp(1, 500)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_small_file() {
        assert_eq!(estimate_page_count(100 * 1024), 2);
    }

    #[test]
    fn estimates_mid_file() {
        assert_eq!(estimate_page_count(1000 * 1024), 7);
    }

    #[test]
    fn estimates_large_file() {
        assert_eq!(estimate_page_count(10_000 * 1024), 34);
    }

    #[test]
    fn clamps_to_minimum_one() {
        assert_eq!(estimate_page_count(0), 1);
    }

    #[test]
    fn clamps_to_maximum_500() {
        assert_eq!(estimate_page_count(1_000_000 * 1024), 500);
    }
}
