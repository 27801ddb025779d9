//! Reading source files and describing them.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use ignore::WalkBuilder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Extension → language label
const LANGUAGES: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("rs", "rust"),
    ("java", "java"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("hpp", "cpp"),
    ("c", "c"),
    ("h", "c"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("sh", "shell"),
    ("md", "markdown"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("txt", "text"),
];

/// Language label for a path, `"unknown"` when the extension is not recognized
pub fn detect_language(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "unknown";
    };
    let ext = ext.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(known, _)| *known == ext)
        .map_or("unknown", |(_, language)| language)
}

/// Read a file as text, decoded with [`decode_text`].
///
/// Returns `None` when the file cannot be read at all.
pub fn read_text(path: &Path) -> Option<String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    let (text, encoding) = decode_text(&bytes);
    if encoding != UTF_8 {
        tracing::debug!("{} decoded as {}", path.display(), encoding.name());
    }
    Some(text)
}

/// Decode raw bytes to UTF-8.
///
/// Detection order: BOM, then UTF-8 validation, then a chardetng guess for
/// legacy encodings. A BOM is stripped from the returned text.
pub fn decode_text(bytes: &[u8]) -> (String, &'static Encoding) {
    let encoding = match Encoding::for_bom(bytes) {
        Some((encoding, _)) => encoding,
        None if std::str::from_utf8(bytes).is_ok() => UTF_8,
        None => {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        }
    };

    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!("Malformed {} sequences replaced", actual.name());
    }
    (text.into_owned(), actual)
}

/// A file is binary when its first 1024 bytes contain a NUL byte
pub fn is_binary(path: &Path) -> bool {
    let mut head = [0u8; 1024];
    let read = fs::File::open(path).and_then(|mut file| file.read(&mut head));
    match read {
        Ok(n) => head[..n].contains(&0),
        Err(_) => true,
    }
}

/// Enumerate code files under `root`, honoring ignore files and skipping
/// hidden entries, unknown extensions and binaries. Sorted for stable output.
pub fn list_code_files(root: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .standard_filters(true)
        .hidden(true) // Skip hidden files
        .build();

    let mut files: Vec<PathBuf> = walker
        .flatten()
        .filter(|entry| entry.file_type().map_or(false, |ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| detect_language(path) != "unknown")
        .filter(|path| !is_binary(path))
        .collect();

    files.sort();
    tracing::info!("Found {} code files under {}", files.len(), root.display());
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("src/script.py")), "python");
        assert_eq!(detect_language(Path::new("README.md")), "markdown");
        assert_eq!(detect_language(Path::new("lib.RS")), "rust");
        assert_eq!(detect_language(Path::new("Makefile")), "unknown");
        assert_eq!(detect_language(Path::new("image.png")), "unknown");
    }

    #[test]
    fn test_read_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.py");
        fs::write(&path, "# Merhaba dünya\nx = 1").unwrap();
        assert!(read_text(&path).unwrap().contains("Merhaba dünya"));
    }

    #[test]
    fn test_read_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.py");
        fs::write(&path, b"# caf\xe9\nx = 1").unwrap();
        let text = read_text(&path).unwrap();
        assert!(text.contains("x = 1"));
        assert!(text.contains("caf\u{e9}"));
    }

    #[test]
    fn test_read_windows_1252_punctuation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.py");
        fs::write(
            &path,
            b"# Caf\xe9 menu: \x93quoted\x94 price is 5\x80 for the na\xefve user\nx = 1\n",
        )
        .unwrap();
        let text = read_text(&path).unwrap();
        assert!(text.contains("\u{201c}quoted\u{201d}"));
        assert!(text.contains("5\u{20ac}"));
        assert!(text.contains("na\u{ef}ve"));
        assert!(!text.chars().any(|c| ('\u{80}'..='\u{9f}').contains(&c)));
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let (text, encoding) = decode_text(b"\xef\xbb\xbfx = 1\n");
        assert_eq!(text, "x = 1\n");
        assert_eq!(encoding, UTF_8);

        let (plain, encoding) = decode_text("# dünya\n".as_bytes());
        assert_eq!(plain, "# dünya\n");
        assert_eq!(encoding, UTF_8);
    }

    #[test]
    fn test_missing_file_is_none() {
        assert!(read_text(Path::new("/nonexistent/path/file.py")).is_none());
    }

    #[test]
    fn test_is_binary() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("a.py");
        let binary = dir.path().join("b.py");
        fs::write(&text, "x = 1\n").unwrap();
        fs::write(&binary, b"x\0y").unwrap();
        assert!(!is_binary(&text));
        assert!(is_binary(&binary));
    }

    #[test]
    fn test_list_code_files_filters() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/mod.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("blob.py"), b"\0\0\0").unwrap();
        fs::write(dir.path().join("photo.png"), "not really").unwrap();
        fs::write(dir.path().join(".hidden.py"), "x = 2\n").unwrap();

        let files = list_code_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["main.rs", "pkg/mod.py"]);
    }
}
