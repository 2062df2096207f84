//! Foundational low-level utilities shared across Poke crates.
//!
//! Provides the atomic file-write helper used by favorites persistence and
//! the text normalization helper used when storing Pokémon names.

pub mod atomic_io;
pub mod text_utils;

pub use atomic_io::write_text_atomic;
pub use text_utils::capitalize_first;

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sample.json");
        write_text_atomic(&path, "{\"ok\":true}").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "{\"ok\":true}");
    }

    #[test]
    fn write_text_atomic_replaces_existing_file() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sample.json");
        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");
        assert_eq!(read_to_string(&path).expect("read"), "second");
    }

    #[test]
    fn capitalize_first_uppercases_only_the_leading_letter() {
        assert_eq!(capitalize_first("pikachu"), "Pikachu");
        assert_eq!(capitalize_first("PIKACHU"), "PIKACHU");
        assert_eq!(capitalize_first(""), "");
    }
}
