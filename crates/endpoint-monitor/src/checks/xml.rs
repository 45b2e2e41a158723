//! XML canonicalisation, so that formatting-only changes on the origin server
//! do not show up as content changes.

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error(transparent)]
    Parse(#[from] quick_xml::Error),
    #[error(transparent)]
    Write(#[from] std::io::Error),
    #[error("document has no root element")]
    NoRoot,
    #[error("content outside the root element")]
    OutsideRoot,
    #[error("document ends inside an element")]
    Unclosed,
}

/// Re-emit a well-formed document with two-space indentation and trimmed text.
pub fn pretty_print(bytes: &[u8]) -> Result<Vec<u8>, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut writer = Writer::new_with_indent(Vec::with_capacity(bytes.len()), b' ', 2);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut roots = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Eof => break,
            Event::Start(_) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Empty(_) if depth == 0 => roots += 1,
            Event::Text(_) | Event::CData(_) if depth == 0 => return Err(XmlError::OutsideRoot),
            _ => {}
        }
        if roots > 1 {
            return Err(XmlError::OutsideRoot);
        }

        writer.write_event(event)?;
        buf.clear();
    }

    if depth != 0 {
        return Err(XmlError::Unclosed);
    }
    if roots == 0 {
        return Err(XmlError::NoRoot);
    }

    let mut pretty = writer.into_inner();
    pretty.push(b'\n');
    Ok(pretty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatting_differences_disappear() {
        let compact = pretty_print(b"<ps><site id=\"1\">Heath</site><site id=\"2\"/></ps>").unwrap();
        let spaced = pretty_print(
            b"<ps>\n    <site id=\"1\">  Heath  </site>\n\n  <site id=\"2\"/>\n</ps>\n",
        )
        .unwrap();

        assert_eq!(compact, spaced);
        assert_eq!(
            String::from_utf8(compact).unwrap(),
            "<ps>\n  <site id=\"1\">Heath</site>\n  <site id=\"2\"/>\n</ps>\n"
        );
    }

    #[test]
    fn test_declaration_is_kept() {
        let pretty = pretty_print(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>").unwrap();
        assert_eq!(
            String::from_utf8(pretty).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a/>\n"
        );
    }

    #[test]
    fn test_rejects_non_xml() {
        assert!(matches!(pretty_print(b"abc"), Err(XmlError::OutsideRoot)));
        assert!(matches!(pretty_print(b""), Err(XmlError::NoRoot)));
        assert!(pretty_print(b"<a><b></a>").is_err());
        assert!(pretty_print(b"<a/><b/>").is_err());
        assert!(pretty_print(b"<a>").is_err());
    }
}
