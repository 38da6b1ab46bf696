use lopdf::Document;
use tracing::debug;

/// Native text layer of the leading pages of a PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfText {
    /// Total pages in the document.
    pub page_count: u32,
    /// Native text of pages `1..=min(page_count, max_pages)`, in page order.
    pub pages: Vec<String>,
}

impl PdfText {
    pub fn processed_pages(&self) -> u32 {
        self.pages.len() as u32
    }
}

/// Parse the document and pull its text layer. A parse failure means the
/// blob is not a usable PDF. A page whose text layer cannot be decoded
/// contributes an empty string.
pub fn read_pages(bytes: &[u8], max_pages: u32) -> Result<PdfText, lopdf::Error> {
    let doc = Document::load_mem(bytes)?;
    let numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let page_count = numbers.len() as u32;

    let pages = numbers
        .into_iter()
        .take(max_pages as usize)
        .map(|n| match doc.extract_text(&[n]) {
            Ok(text) => text,
            Err(e) => {
                debug!(page = n, error = %e, "No native text for page");
                String::new()
            }
        })
        .collect();

    Ok(PdfText { page_count, pages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pdf_with_pages;

    #[test]
    fn reads_native_text_in_page_order() {
        let pdf = pdf_with_pages(&["Hello", "World"]);
        let text = read_pages(&pdf, 5).unwrap();
        assert_eq!(text.page_count, 2);
        assert_eq!(text.processed_pages(), 2);
        assert!(text.pages[0].contains("Hello"));
        assert!(text.pages[1].contains("World"));
    }

    #[test]
    fn honours_page_cap() {
        let pdf = pdf_with_pages(&["one", "two", "three"]);
        let text = read_pages(&pdf, 2).unwrap();
        assert_eq!(text.page_count, 3);
        assert_eq!(text.processed_pages(), 2);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(read_pages(b"%PDF-1.4 but nothing else", 5).is_err());
    }
}
