use std::ffi::OsString;

const TEMP_PREFIX: &str = ".dirio-";

/// Random hidden file name for a temporary file that is unlinked right after
/// creation.
pub fn temp_file_name(suffix_len: usize) -> OsString {
    let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
        .take(suffix_len)
        .collect();
    let mut name = OsString::from(TEMP_PREFIX);
    name.push(suffix);
    name
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_temp_file_name() {
        let name = super::temp_file_name(12);
        let name = name.to_str().unwrap();
        let suffix = name.strip_prefix(super::TEMP_PREFIX).unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(super::temp_file_name(12), super::temp_file_name(12));
    }
}
