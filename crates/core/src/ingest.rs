use crate::chunking::Chunker;
use crate::error::IngestError;
use crate::models::{ExtractedText, IndexedChunk};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Expands directories into the PDFs below them; files are kept in the order
/// given. Missing paths are rejected up front.
pub fn collect_inputs<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();

    for input in inputs {
        let path = input.as_ref();
        if path.is_dir() {
            files.extend(discover_pdf_files(path));
        } else if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            return Err(IngestError::InvalidArgument(format!(
                "file does not exist: {}",
                path.display()
            )));
        }
    }

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no pdf files to process".to_string(),
        ));
    }

    Ok(files)
}

/// Splits extracted text into owned chunks that remember the pages they
/// were cut from.
pub fn chunk_extracted(chunker: &Chunker, extracted: &ExtractedText) -> Vec<IndexedChunk> {
    chunker
        .chunks(&extracted.text)
        .map(|chunk| IndexedChunk {
            chunk_index: chunk.index as u64,
            text: chunk.text.to_string(),
            start: chunk.start,
            end: chunk.end,
            pages: extracted.pages_for(chunk.start, chunk.end),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{chunk_extracted, collect_inputs, discover_pdf_files};
    use crate::chunking::{Chunker, ChunkingConfig};
    use crate::models::ExtractedText;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(base.join("notes.txt"), b"not a pdf")?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_input_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = collect_inputs(&[dir.path().join("absent.pdf")]);
        assert!(result.is_err());

        let empty = collect_inputs(&[dir.path()]);
        assert!(empty.is_err());
        Ok(())
    }

    #[test]
    fn chunks_carry_page_provenance() -> Result<(), Box<dyn std::error::Error>> {
        let mut extracted = ExtractedText::default();
        extracted.push_page("doc.pdf", 1, "Pumps move fluid under pressure.\n");
        extracted.push_page("doc.pdf", 3, "Glaciers retreat in warm summers.\n");

        let chunker = Chunker::new(ChunkingConfig::with_size(40, 0))?;
        let chunks = chunk_extracted(&chunker, &extracted);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].from_page(1) && !chunks[0].from_page(3));
        assert!(chunks[1].from_page(3) && !chunks[1].from_page(1));
        assert_eq!(chunks[1].chunk_index, 1);
        Ok(())
    }
}
