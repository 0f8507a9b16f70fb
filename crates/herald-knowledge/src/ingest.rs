use std::path::{Path, PathBuf};

use tracing::{info, warn};

use herald_core::error::{HeraldError, Result};

use crate::store::KnowledgeBase;

const EXTENSIONS: &[&str] = &["txt", "md"];

/// A text file loaded for ingestion.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub text: String,
}

/// Summary of one `ingest_dir` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: Vec<String>,
}

/// Load every `.txt` / `.md` file under `dir`, recursively, in path order.
///
/// Files that are not valid UTF-8 are skipped with a warning.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(HeraldError::Config(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    collect_paths(dir, &mut paths)?;
    paths.sort();

    let mut docs = Vec::new();
    for path in paths {
        let source = path
            .strip_prefix(dir)
            .unwrap_or(&path)
            .display()
            .to_string();
        match std::fs::read_to_string(&path) {
            Ok(text) => docs.push(Document { source, text }),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
        }
    }
    Ok(docs)
}

fn collect_paths(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_paths(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Split `text` into chunks of at most `chunk_size` characters.
///
/// Paragraphs (blank-line separated) are packed greedily; consecutive chunks
/// share trailing paragraphs worth up to `overlap` characters. A paragraph
/// longer than `chunk_size` is cut into windows that step by
/// `chunk_size - overlap`.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let mut pieces: Vec<String> = Vec::new();
    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if para.chars().count() <= chunk_size {
            pieces.push(para.to_string());
        } else {
            pieces.extend(windows(para, chunk_size, overlap));
        }
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut len = 0;
    for piece in &pieces {
        let piece_len = piece.chars().count();
        let joined_len = if current.is_empty() { piece_len } else { len + 2 + piece_len };
        if joined_len > chunk_size && !current.is_empty() {
            chunks.push(current.join("\n\n"));
            // Keep a tail of paragraphs as overlap into the next chunk.
            while !current.is_empty() && (len > overlap || len + 2 + piece_len > chunk_size) {
                let dropped = current.remove(0).chars().count();
                len = len.saturating_sub(dropped + 2);
                if current.is_empty() {
                    len = 0;
                }
            }
        }
        len = if current.is_empty() { piece_len } else { len + 2 + piece_len };
        current.push(piece);
    }
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

fn windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap;
    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        out.push(chars[start..end].iter().collect::<String>().trim().to_string());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

/// Load, split and store every document under `dir`.
pub fn ingest_dir(
    kb: &KnowledgeBase,
    dir: &Path,
    chunk_size: usize,
    overlap: usize,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    for doc in load_documents(dir)? {
        let chunks = split_text(&doc.text, chunk_size, overlap);
        if chunks.is_empty() {
            report.skipped.push(doc.source);
            continue;
        }
        report.chunks += kb.add_chunks(&doc.source, &chunks)?;
        report.documents += 1;
    }
    info!(
        dir = %dir.display(),
        documents = report.documents,
        chunks = report.chunks,
        skipped = report.skipped.len(),
        "Knowledge ingested"
    );
    Ok(report)
}
