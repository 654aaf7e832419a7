use crate::error::IngestError;
use lopdf::Document;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Text of every page that has any, in page order.
pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
    let document =
        Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        if !text.trim().is_empty() {
            pages.push(PageText {
                number: page_no,
                text,
            });
        }
    }

    Ok(pages)
}

/// Pages joined by newlines. A PDF without any text layer is an error.
pub fn pdf_text(bytes: &[u8]) -> Result<String, IngestError> {
    let pages = extract_page_texts(bytes)?;
    if pages.is_empty() {
        return Err(IngestError::PdfParse(
            "pdf had no readable page text".to_string(),
        ));
    }

    Ok(pages
        .into_iter()
        .map(|page| page.text)
        .collect::<Vec<_>>()
        .join("\n"))
}


#[cfg(test)]
mod tests {
    use super::fixtures::pdf_with_pages;
    use super::*;

    #[test]
    fn every_page_with_text_is_extracted_in_order() {
        let bytes = pdf_with_pages(&["Article 1. Scope", "Article 2. Terms"]);

        let pages = extract_page_texts(&bytes).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("Article 1. Scope"));
        assert!(pages[1].text.contains("Article 2. Terms"));

        let text = pdf_text(&bytes).unwrap();
        let first = text.find("Article 1").unwrap();
        let second = text.find("Article 2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn pdf_without_text_is_rejected() {
        let bytes = pdf_with_pages(&[""]);
        assert!(matches!(pdf_text(&bytes), Err(IngestError::PdfParse(_))));
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let error = extract_page_texts(b"definitely not a pdf").unwrap_err();
        assert!(matches!(error, IngestError::PdfParse(_)));
    }
}
