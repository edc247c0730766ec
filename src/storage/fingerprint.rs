/// Derive the storage key for a file from its metadata.
///
/// Two files with the same name, modification time and size are treated as
/// the same file: they share a key and the later write replaces the earlier.
pub fn fingerprint(name: &str, last_modified: i64, size: u64) -> String {
    format!("{}-{}-{}", name, last_modified, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_documented_format() {
        assert_eq!(fingerprint("report.pdf", 1000, 1024), "report.pdf-1000-1024");
    }

    #[test]
    fn identical_metadata_yields_identical_key() {
        let a = fingerprint("notes.txt", 1_700_000_000_123, 42);
        let b = fingerprint("notes.txt", 1_700_000_000_123, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn any_field_change_changes_key() {
        let base = fingerprint("a.bin", 10, 3);
        assert_ne!(base, fingerprint("b.bin", 10, 3));
        assert_ne!(base, fingerprint("a.bin", 11, 3));
        assert_ne!(base, fingerprint("a.bin", 10, 4));
    }

    #[test]
    fn negative_timestamps_are_accepted() {
        assert_eq!(fingerprint("old", -5, 0), "old--5-0");
    }
}
