use crate::error::{RAGError, Result};
use jwalk::WalkDir;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{
    io,
    path::{Path, PathBuf},
};

/// Text of a single PDF page. `page` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub page: u32,
    pub text: String,
}

/// Loads every page of every `*.pdf` under `root`, recursively.
///
/// Files are visited in sorted path order and pages in page order, so repeated runs over
/// the same directory emit documents in the same sequence. Hidden files are skipped.
/// Any unreadable or malformed PDF fails the whole load.
pub fn grab_all_documents(root: &Path) -> Result<Vec<Document>> {
    if !root.exists() {
        return Err(RAGError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Root path does not exist: {}", root.display()),
        )));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .sort(true)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) if entry.file_type().is_file() => {
                let path = entry.path();
                is_visible_pdf(&path).then_some(path)
            }
            Ok(_) => None,
            Err(err) => {
                log::warn!("Failed to walk directory entry: {}", err);
                None
            }
        })
        .collect();
    paths.sort();

    let per_file: Result<Vec<Vec<Document>>> =
        paths.par_iter().map(|path| load_pdf(path)).collect();

    let docs: Vec<Document> = per_file?.into_iter().flatten().collect();
    log::info!("loaded {} pages from {} PDF files", docs.len(), paths.len());
    Ok(docs)
}

fn is_visible_pdf(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    is_pdf && !hidden
}

/// Extracts each page of one PDF as its own document.
pub fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    let pdf = lopdf::Document::load(path).map_err(|e| RAGError::PdfParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let source = path.display().to_string();

    let mut docs = Vec::new();
    // get_pages is keyed by one-based page number in document order
    for (number, _) in pdf.get_pages() {
        let text = pdf
            .extract_text(&[number])
            .map_err(|e| RAGError::PdfParse {
                path: path.to_path_buf(),
                source: e,
            })?;
        docs.push(Document {
            source: source.clone(),
            page: number.saturating_sub(1),
            text,
        });
    }
    log::debug!("{}: {} pages", source, docs.len());
    Ok(docs)
}

const STRIPPED_PUNCTUATION: [char; 3] = ['，', '。', '、'];

/// Removes full-width commas, full stops and enumeration commas, keeping ASCII
/// punctuation and decimal points, then collapses whitespace runs to a single space.
pub fn preprocess_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
