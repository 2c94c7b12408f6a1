//! Per-format file parsers producing ordered paragraph lists.
//!
//! Each supported format (HTML, DOCX, PDF) has its own [`FormatParser`]
//! strategy; [`FileParser`] dispatches on the file extension and fails with
//! [`ParseError::UnsupportedFormat`] for anything else. Parsers only recover
//! flat paragraph order — no headings, tables, or other structure.

use std::io::Read;
use std::path::Path;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Parse failure. `UnsupportedFormat` aborts the whole extraction run —
/// a partial index is worse than a clear failure.
#[derive(Debug)]
pub enum ParseError {
    UnsupportedFormat(String),
    Html(String),
    Docx(String),
    Pdf(String),
    Io(std::io::Error),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnsupportedFormat(ext) => {
                write!(
                    f,
                    "unsupported file type: '{}' (supported: html, docx, pdf)",
                    ext
                )
            }
            ParseError::Html(e) => write!(f, "HTML parsing failed: {}", e),
            ParseError::Docx(e) => write!(f, "DOCX parsing failed: {}", e),
            ParseError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ParseError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for ParseError {}

/// A single-format parsing strategy: raw file bytes in, ordered paragraph
/// strings out.
pub trait FormatParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<String>, ParseError>;
}

/// Extension-dispatched file parser.
///
/// The per-format strategies are constructor-injected so tests can
/// substitute fakes; [`FileParser::default`] wires the real three.
pub struct FileParser {
    html: Box<dyn FormatParser>,
    docx: Box<dyn FormatParser>,
    pdf: Box<dyn FormatParser>,
}

impl FileParser {
    pub fn new(
        html: Box<dyn FormatParser>,
        docx: Box<dyn FormatParser>,
        pdf: Box<dyn FormatParser>,
    ) -> Self {
        Self { html, docx, pdf }
    }

    /// True if `path` has an extension this parser can dispatch.
    pub fn supports(path: &Path) -> bool {
        matches!(
            extension_of(path).as_str(),
            "html" | "docx" | "pdf"
        )
    }

    /// Parse one file into its ordered paragraph list.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<String>, ParseError> {
        let ext = extension_of(path);
        let parser: &dyn FormatParser = match ext.as_str() {
            "html" => self.html.as_ref(),
            "docx" => self.docx.as_ref(),
            "pdf" => self.pdf.as_ref(),
            other => return Err(ParseError::UnsupportedFormat(other.to_string())),
        };
        let bytes = std::fs::read(path).map_err(ParseError::Io)?;
        parser.parse(&bytes)
    }
}

impl Default for FileParser {
    fn default() -> Self {
        Self::new(
            Box::new(HtmlParser),
            Box::new(DocxParser),
            Box::new(PdfParser),
        )
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

// ============ HTML ============

/// Extracts the text of every `<p>` element, in document order. Structural
/// markup and non-paragraph content are discarded; inline markup inside a
/// paragraph is flattened into its text.
pub struct HtmlParser;

impl FormatParser for HtmlParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<String>, ParseError> {
        let mut reader = quick_xml::Reader::from_reader(bytes);
        reader.config_mut().check_end_names = false;
        let mut buf = Vec::new();
        let mut paragraphs = Vec::new();
        let mut depth = 0usize;
        let mut current = String::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(quick_xml::events::Event::Start(e)) => {
                    if e.local_name().as_ref() == b"p" {
                        depth += 1;
                    }
                }
                Ok(quick_xml::events::Event::End(e)) => {
                    if e.local_name().as_ref() == b"p" && depth > 0 {
                        depth -= 1;
                        if depth == 0 {
                            paragraphs.push(std::mem::take(&mut current));
                        }
                    }
                }
                Ok(quick_xml::events::Event::Text(t)) if depth > 0 => {
                    current.push_str(t.unescape().unwrap_or_default().as_ref());
                }
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => return Err(ParseError::Html(e.to_string())),
                _ => {}
            }
            buf.clear();
        }
        Ok(paragraphs)
    }
}

// ============ DOCX ============

/// Extracts paragraphs from `word/document.xml` inside the OOXML ZIP
/// container: one entry per `<w:p>` that carries at least one run with
/// non-whitespace text, preserving document order.
pub struct DocxParser;

impl FormatParser for DocxParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<String>, ParseError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| ParseError::Docx(e.to_string()))?;
        let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
        parse_docx_paragraphs(&doc_xml)
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ParseError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ParseError::Docx(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ParseError::Docx(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ParseError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn parse_docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ParseError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut in_paragraph = false;
    let mut in_text = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    in_paragraph = true;
                    current.clear();
                }
                b"t" if in_paragraph => in_text = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(t)) if in_text => {
                current.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if in_paragraph => {
                    in_paragraph = false;
                    // Paragraphs whose runs are all whitespace are dropped.
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ParseError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

// ============ PDF ============

/// Delegates byte-level extraction to `pdf-extract` and splits the result on
/// blank-line boundaries, replacing embedded newlines with spaces and
/// dropping empty segments.
pub struct PdfParser;

impl FormatParser for PdfParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<String>, ParseError> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ParseError::Pdf(e.to_string()))?;
        Ok(text
            .split("\n\n")
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.replace('\n', " "))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_unsupported() {
        let parser = FileParser::default();
        let err = parser.parse_file(Path::new("/tmp/whatever.pptx")).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(ref e) if e == "pptx"));
    }

    #[test]
    fn html_paragraphs_in_order() {
        let html = b"<html><body>\
            <h1>Title ignored</h1>\
            <p>First paragraph.</p>\
            <div>not a paragraph</div>\
            <p>Second <b>bold</b> paragraph.</p>\
            </body></html>";
        let paragraphs = HtmlParser.parse(html).unwrap();
        assert_eq!(
            paragraphs,
            vec!["First paragraph.", "Second bold paragraph."]
        );
    }

    #[test]
    fn html_entities_unescaped() {
        let html = b"<p>Fish &amp; chips.</p>";
        let paragraphs = HtmlParser.parse(html).unwrap();
        assert_eq!(paragraphs, vec!["Fish & chips."]);
    }

    #[test]
    fn docx_skips_whitespace_only_paragraphs() {
        let xml = br#"<w:document xmlns:w="ns">
            <w:body>
              <w:p><w:r><w:t>First paragraph text.</w:t></w:r></w:p>
              <w:p><w:r><w:t>   </w:t></w:r></w:p>
              <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph.</w:t></w:r></w:p>
            </w:body>
          </w:document>"#;
        let paragraphs = parse_docx_paragraphs(xml).unwrap();
        assert_eq!(
            paragraphs,
            vec!["First paragraph text.", "Second paragraph."]
        );
    }

    #[test]
    fn invalid_zip_is_docx_error() {
        let err = DocxParser.parse(b"not a zip").unwrap_err();
        assert!(matches!(err, ParseError::Docx(_)));
    }

    #[test]
    fn invalid_pdf_is_pdf_error() {
        let err = PdfParser.parse(b"not a pdf").unwrap_err();
        assert!(matches!(err, ParseError::Pdf(_)));
    }
}
