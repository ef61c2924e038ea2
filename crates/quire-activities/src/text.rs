// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Text utilities: sanitation, chunking, hashing, metadata heuristics.

use sha2::{Digest, Sha256};

/// Strip bytes the store rejects: NUL and non-printing controls other than
/// newline, carriage return, and tab. Result is trimmed.
pub fn sanitize_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    s.chars()
        .filter(|&ch| ch == '\n' || ch == '\r' || ch == '\t' || ch >= '\u{20}')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Deterministic sliding-window split over characters.
///
/// Window of `chunk_size` advancing by `chunk_size - overlap`; empty windows
/// are dropped, each kept window is trimmed.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = if chunk_size == 0 { 1200 } else { chunk_size };
    let overlap = if overlap >= chunk_size { 0 } else { overlap };
    let chars: Vec<char> = text.chars().collect();
    let step = (chunk_size - overlap).max(1);

    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let end = (i + chunk_size).min(chars.len());
        let part: String = chars[i..end].iter().collect();
        let part = part.trim();
        if !part.is_empty() {
            out.push(part.to_string());
        }
        if end == chars.len() {
            break;
        }
        i += step;
    }
    out
}

/// SHA-256 hex digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Chunk identity: sha256 of `paper_id:index:content_hash:version`.
pub fn chunk_id(paper_id: &str, index: usize, content: &str, version: &str) -> String {
    let content_hash = sha256_hex(content.as_bytes());
    sha256_hex(format!("{}:{}:{}:{}", paper_id, index, content_hash, version).as_bytes())
}

/// Heuristic title and authors: the first two non-empty lines.
pub fn heuristic_title_and_authors(text: &str) -> (String, String) {
    let mut non_empty = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(2);
    let title = non_empty.next().unwrap_or_default().to_string();
    let authors = non_empty.next().unwrap_or_default().to_string();
    (title, authors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_nul_and_controls() {
        assert_eq!(sanitize_text("a\u{0}b"), "ab");
        assert_eq!(sanitize_text("a\u{1}\u{2}b"), "ab");
        assert_eq!(sanitize_text("  keep\nnewlines\tand tabs  "), "keep\nnewlines\tand tabs");
        assert_eq!(sanitize_text(""), "");
        assert_eq!(sanitize_text("\u{0}\u{1}"), "");
    }

    #[test]
    fn test_chunk_text_window_and_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text(text, 10, 2);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0], "abcdefghij");
        // Step of 8: second window starts at 'i'.
        assert_eq!(chunks[1], "ijklmnopqr");
    }

    #[test]
    fn test_chunk_text_defaults_and_bounds() {
        // Zero size falls back to 1200: short text is one chunk.
        assert_eq!(chunk_text("hello", 0, 0), vec!["hello"]);
        // Overlap >= size is treated as zero overlap, not an infinite loop.
        let chunks = chunk_text("abcdefghij", 4, 9);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
        // Empty text chunks to nothing.
        assert!(chunk_text("", 10, 2).is_empty());
    }

    #[test]
    fn test_chunk_text_is_character_based() {
        // Multi-byte characters must not split mid-codepoint.
        let text = "日本語のテキストです";
        let chunks = chunk_text(text, 4, 1);
        assert_eq!(chunks[0], "日本語の");
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_chunk_id_varies_with_each_component() {
        let base = chunk_id("p1", 0, "text", "v1");
        assert_ne!(base, chunk_id("p2", 0, "text", "v1"));
        assert_ne!(base, chunk_id("p1", 1, "text", "v1"));
        assert_ne!(base, chunk_id("p1", 0, "other", "v1"));
        assert_ne!(base, chunk_id("p1", 0, "text", "v2"));
        assert_eq!(base, chunk_id("p1", 0, "text", "v1"));
    }

    #[test]
    fn test_heuristic_title_and_authors() {
        let text = "\n\n  Attention Is All You Need  \n\nVaswani et al.\nAbstract\n";
        let (title, authors) = heuristic_title_and_authors(text);
        assert_eq!(title, "Attention Is All You Need");
        assert_eq!(authors, "Vaswani et al.");

        let (title, authors) = heuristic_title_and_authors("only-title");
        assert_eq!(title, "only-title");
        assert_eq!(authors, "");
    }
}
