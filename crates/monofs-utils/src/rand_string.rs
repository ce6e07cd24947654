use rand::Rng;

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a random alphanumeric string of the given length.
pub fn rand_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length() {
        assert_eq!(rand_string(0).len(), 0);
        assert_eq!(rand_string(32).len(), 32);
    }

    #[test]
    fn test_alphanumeric_only() {
        let s = rand_string(256);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_not_constant() {
        // 32 chars of 62-symbol alphabet colliding twice is not a thing.
        assert_ne!(rand_string(32), rand_string(32));
    }
}
