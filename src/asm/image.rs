//! T3 program images.
//!
//! Two formats:
//! - Text (`.t3`): one 27-trit word per line as N/O/P characters, most
//!   significant trit first. Lines starting with `;` are comments and blank
//!   lines are ignored. Anything after the word on a line is ignored.
//! - Binary: magic `T3IM`, a little-endian u32 word count, then every word
//!   as a little-endian i64. This is the format the `exec` syscall loads.

use std::io::Write;
use std::path::Path;
use thiserror::Error;
use crate::ternary::Word;

/// Binary image magic.
pub const IMAGE_MAGIC: &[u8; 4] = b"T3IM";

const HEADER_LEN: usize = 8;
const WORD_BYTES: usize = 8;

/// Size in bytes of a binary image holding `words` words.
pub fn binary_len(words: usize) -> usize {
    HEADER_LEN + words * WORD_BYTES
}

/// Serialise words into a binary image.
pub fn to_bytes(words: &[Word]) -> Vec<u8> {
    let mut out = Vec::with_capacity(binary_len(words.len()));
    out.extend_from_slice(IMAGE_MAGIC);
    out.extend_from_slice(&(words.len() as u32).to_le_bytes());
    for word in words {
        out.extend_from_slice(&word.to_i64().to_le_bytes());
    }
    out
}

/// Parse a binary image. Trailing bytes past the declared count are ignored.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<Word>, ImageError> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != IMAGE_MAGIC {
        return Err(ImageError::BadMagic);
    }
    let mut count_bytes = [0u8; 4];
    count_bytes.copy_from_slice(&bytes[4..HEADER_LEN]);
    let count = u32::from_le_bytes(count_bytes) as usize;

    let body = &bytes[HEADER_LEN..];
    if body.len() < count * WORD_BYTES {
        return Err(ImageError::Truncated { expected: count, got: body.len() / WORD_BYTES });
    }

    body.chunks_exact(WORD_BYTES)
        .take(count)
        .enumerate()
        .map(|(i, chunk)| {
            let mut raw = [0u8; WORD_BYTES];
            raw.copy_from_slice(chunk);
            let value = i64::from_le_bytes(raw);
            Word::try_from_i64(value).ok_or(ImageError::WordOutOfRange { index: i, value })
        })
        .collect()
}

/// Render words in the text image format.
pub fn to_text(words: &[Word]) -> String {
    let mut out = String::new();
    out.push_str("; T3 image\n");
    out.push_str(&format!("; {} words\n\n", words.len()));
    for (i, word) in words.iter().enumerate() {
        let trits = word.to_string();
        out.push_str(&format!("{} ; {:04}\n", trits.trim_start_matches("0t"), i));
    }
    out
}

/// Parse the text image format.
pub fn from_text(text: &str) -> Result<Vec<Word>, ImageError> {
    let mut words = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let trimmed = line.trim();

        // Skip empty lines and comments
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }

        let trit_str: String = trimmed
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != ';')
            .collect();

        if trit_str.chars().count() != Word::WIDTH {
            return Err(ImageError::ParseError {
                line: line_num + 1,
                message: format!("expected {} trits, found {}", Word::WIDTH, trit_str.chars().count()),
            });
        }

        let word = Word::parse(&trit_str).map_err(|e| ImageError::ParseError {
            line: line_num + 1,
            message: e.to_string(),
        })?;
        words.push(word);
    }

    Ok(words)
}

/// Load an image from disk, detecting the format from the magic bytes.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Vec<Word>, ImageError> {
    let bytes = std::fs::read(path.as_ref()).map_err(|e| ImageError::IoError(e.to_string()))?;
    if bytes.starts_with(IMAGE_MAGIC) {
        return from_bytes(&bytes);
    }
    let text = String::from_utf8(bytes).map_err(|e| ImageError::IoError(e.to_string()))?;
    from_text(&text)
}

/// Save an image to disk in the text or binary format.
pub fn save_image<P: AsRef<Path>>(path: P, words: &[Word], binary: bool) -> Result<(), ImageError> {
    let mut file = std::fs::File::create(path.as_ref()).map_err(|e| ImageError::IoError(e.to_string()))?;
    let data = if binary { to_bytes(words) } else { to_text(words).into_bytes() };
    file.write_all(&data).map_err(|e| ImageError::IoError(e.to_string()))
}

/// Errors that can occur reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("missing T3IM header")]
    BadMagic,

    #[error("image truncated: header declares {expected} words, found {got}")]
    Truncated { expected: usize, got: usize },

    #[error("word {index} holds {value}, outside the 27-trit range")]
    WordOutOfRange { index: usize, value: i64 },
}
