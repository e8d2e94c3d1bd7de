use crate::error::IngestError;
use crate::models::ExtractedText;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    /// Every page of the document in page order. Pages without extractable
    /// text are returned with an empty string rather than skipped.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| parse_error(path, error))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| parse_error(path, error))?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

fn parse_error(path: &Path, error: lopdf::Error) -> IngestError {
    IngestError::PdfParse {
        path: path.display().to_string(),
        details: error.to_string(),
    }
}

/// Concatenates the text of every page of every file, in order, with no
/// separator. The first unreadable file aborts the whole batch.
pub fn extract_text<X, P>(extractor: &X, paths: &[P]) -> Result<ExtractedText, IngestError>
where
    X: PdfExtractor + ?Sized,
    P: AsRef<Path>,
{
    let mut extracted = ExtractedText::default();

    for path in paths {
        let path = path.as_ref();
        let source = path.to_string_lossy();
        for page in extractor.extract_pages(path)? {
            extracted.push_page(&source, page.number, &page.text);
        }
    }

    Ok(extracted)
}


#[cfg(test)]
mod tests {
    use super::fixtures::write_pdf;
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_page_contributes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("three.pdf");
        write_pdf(&path, &["First page words", "", "Third page words"])?;

        let pages = LopdfExtractor.extract_pages(&path)?;
        assert_eq!(pages.len(), 3);
        assert!(pages[1].text.trim().is_empty());

        let extracted = extract_text(&LopdfExtractor, &[&path])?;
        assert!(extracted.text.contains("First page words"));
        assert!(extracted.text.contains("Third page words"));
        assert!(extracted.spans.iter().all(|span| span.page != 2));
        Ok(())
    }

    #[test]
    fn files_are_concatenated_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("a.pdf");
        let second = dir.path().join("b.pdf");
        write_pdf(&first, &["Alpha"])?;
        write_pdf(&second, &["Omega"])?;

        let extracted = extract_text(&LopdfExtractor, &[&first, &second])?;
        let alpha = extracted.text.find("Alpha").ok_or("missing alpha")?;
        let omega = extracted.text.find("Omega").ok_or("missing omega")?;
        assert!(alpha < omega);
        assert_eq!(extracted.spans.len(), 2);
        assert!(extracted.spans[1].source_path.ends_with("b.pdf"));
        Ok(())
    }

    #[test]
    fn unreadable_file_aborts_the_batch() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = dir.path().join("good.pdf");
        let broken = dir.path().join("broken.pdf");
        write_pdf(&good, &["Readable"])?;
        fs::write(&broken, b"%PDF-1.4\n%broken")?;

        let result = extract_text(&LopdfExtractor, &[&good, &broken]);
        assert!(matches!(result, Err(IngestError::PdfParse { .. })));
        Ok(())
    }
}
