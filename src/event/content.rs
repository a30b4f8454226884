use std::borrow::Cow;
use std::sync::Arc;

/// Opaque application payload carried by events and messages
///
/// Content is immutable once built. Both views are derived from the same
/// underlying data: `data()` returns the raw bytes and `text()` a string
/// (lossy when the bytes are not UTF-8). Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Content {
    repr: Repr,
}

#[derive(Debug, Clone)]
enum Repr {
    Bytes(Arc<[u8]>),
    Text(Arc<str>),
}

impl Content {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            repr: Repr::Bytes(bytes.into().into()),
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            repr: Repr::Text(text.into().into()),
        }
    }

    /// Raw byte view
    pub fn data(&self) -> &[u8] {
        match &self.repr {
            Repr::Bytes(bytes) => bytes,
            Repr::Text(text) => text.as_bytes(),
        }
    }

    /// String view, borrowed when the content was built from text
    pub fn text(&self) -> Cow<'_, str> {
        match &self.repr {
            Repr::Bytes(bytes) => String::from_utf8_lossy(bytes),
            Repr::Text(text) => Cow::Borrowed(text),
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::from_text(text)
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::from_text(text)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::from_bytes(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Content::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_views() {
        let content = Content::from_text("test content");
        assert_eq!(content.text(), "test content");
        assert_eq!(content.data(), b"test content");
        assert_eq!(content.len(), 12);
    }

    #[test]
    fn test_byte_content_views() {
        let content = Content::from_bytes(b"{\"x\":1}".to_vec());
        assert_eq!(content.text(), "{\"x\":1}");
        assert_eq!(content.data(), b"{\"x\":1}");
    }

    #[test]
    fn test_invalid_utf8_text_view_is_deterministic() {
        let content = Content::from_bytes(vec![0x66, 0xff, 0x6f]);
        assert_eq!(content.text(), content.text());
        assert_eq!(content.text(), "f\u{fffd}o");
        assert_eq!(content.data(), &[0x66, 0xff, 0x6f]);
    }

    #[test]
    fn test_empty_content() {
        assert!(Content::from("").is_empty());
        assert!(Content::from(Vec::new()).is_empty());
    }
}
