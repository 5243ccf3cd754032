//! Container markup re-wrapping
//!
//! A script wrapped in a single top-level container (e.g. `<speak>…</speak>`)
//! loses the wrapper on every chunk but the first and last once it is split.
//! [`Wrapper`] restores it so each dispatched chunk is standalone markup.
//!
//! This is a prefix/suffix check, not a parser: nested containers with the
//! same name and malformed markup are not supported.

/// A detected top-level container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapper {
    name: String,
    /// Opening tag exactly as authored, attributes included
    open: String,
    close: String,
}

impl Wrapper {
    /// Detect a container enclosing the whole (trimmed) text
    #[must_use]
    pub fn detect(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('<')?;

        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':')) {
            return None;
        }

        let open_end = text.find('>')?;
        let open = &text[..=open_end];
        if open.ends_with("/>") {
            return None;
        }

        let close = format!("</{name}>");
        if !text.ends_with(&close) || text.len() < open.len() + close.len() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            open: open.to_string(),
            close,
        })
    }

    /// Container tag name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-open and/or re-close `chunk` so it is independently well formed
    #[must_use]
    pub fn rewrap(&self, chunk: &str) -> String {
        let chunk = chunk.trim();
        let opened = self.starts_with_open(chunk);
        let closed = chunk.ends_with(&self.close);

        let mut out = String::with_capacity(chunk.len() + self.open.len() + self.close.len());
        if !opened {
            out.push_str(&self.open);
        }
        out.push_str(chunk);
        if !closed {
            out.push_str(&self.close);
        }
        out
    }

    fn starts_with_open(&self, chunk: &str) -> bool {
        chunk
            .strip_prefix('<')
            .and_then(|rest| rest.strip_prefix(self.name.as_str()))
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '>'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plain_container() {
        let w = Wrapper::detect("  <speak>Hello there.</speak>\n").unwrap();
        assert_eq!(w.name(), "speak");
    }

    #[test]
    fn detects_container_with_attributes() {
        let w = Wrapper::detect(r#"<speak version="1.0">Hi</speak>"#).unwrap();
        assert_eq!(w.rewrap("middle part"), r#"<speak version="1.0">middle part</speak>"#);
    }

    #[test]
    fn rejects_unwrapped_or_mismatched_text() {
        assert!(Wrapper::detect("Plain text").is_none());
        assert!(Wrapper::detect("<speak>Unclosed").is_none());
        assert!(Wrapper::detect("<speak>Wrong</prosody>").is_none());
        assert!(Wrapper::detect(r#"<break time="1s"/> and more"#).is_none());
    }

    #[test]
    fn rewrap_adds_only_missing_halves() {
        let w = Wrapper::detect("<speak>a b c</speak>").unwrap();
        assert_eq!(w.rewrap("<speak>a b"), "<speak>a b</speak>");
        assert_eq!(w.rewrap("c</speak>"), "<speak>c</speak>");
        assert_eq!(w.rewrap("b"), "<speak>b</speak>");
        assert_eq!(w.rewrap("<speak>a b c</speak>"), "<speak>a b c</speak>");
    }

    #[test]
    fn similarly_named_tag_is_not_the_opener() {
        let w = Wrapper::detect("<speak>x</speak>").unwrap();
        assert_eq!(w.rewrap("<speaker>x"), "<speak><speaker>x</speak>");
    }
}
