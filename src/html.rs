use super::*;

/// Parses an HTML document or fragment into a [`Dom`].
///
/// The grammar is the subset a server-rendered cart fragment actually uses:
/// start/end tags with quoted, unquoted, or bare attributes, void elements,
/// comments, doctype declarations, raw-text elements (`script`, `style`,
/// `textarea`, `title`), and a small set of character references. Mismatched
/// end tags close open elements up the stack instead of failing.
pub(crate) fn parse_html(html: &str) -> Result<Dom> {
    let mut dom = Dom::new();
    let mut stack = vec![dom.root()];
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            if let Some(end) = find_subslice(bytes, i + 4, b"-->") {
                i = end + 3;
            } else {
                return Err(Error::HtmlParse("unclosed HTML comment".into()));
            }
            continue;
        }

        if bytes[i] == b'<' {
            if starts_with_at(bytes, i, b"</") {
                let (tag, next) = parse_end_tag(html, i)?;
                i = next;

                while stack.len() > 1 {
                    let top = *stack
                        .last()
                        .ok_or_else(|| Error::HtmlParse("invalid stack state".into()))?;
                    let top_tag = dom.tag_name(top).unwrap_or_default();
                    stack.pop();
                    if top_tag.eq_ignore_ascii_case(&tag) {
                        break;
                    }
                }
                continue;
            }

            if starts_with_at(bytes, i, b"<!") {
                i = parse_declaration_tag(html, i)?;
                continue;
            }

            let (tag, attrs, self_closing, next) = parse_start_tag(html, i)?;
            i = next;

            let parent = *stack
                .last()
                .ok_or_else(|| Error::HtmlParse("missing parent element".into()))?;
            let node = dom.create_element(parent, tag.clone(), attrs);

            if is_raw_text_tag(&tag) && !self_closing {
                let close = find_case_insensitive_raw_end_tag(bytes, i, tag.as_bytes())
                    .ok_or_else(|| Error::HtmlParse(format!("unclosed <{tag}>")))?;
                if let Some(body) = html.get(i..close) {
                    if !body.is_empty() {
                        let text = if tag.eq_ignore_ascii_case("script")
                            || tag.eq_ignore_ascii_case("style")
                        {
                            body.to_string()
                        } else {
                            decode_html_character_references(body)
                        };
                        if !text.is_empty() {
                            dom.create_text(node, text);
                        }
                    }
                }
                i = close;
                let (_, after_end) = parse_end_tag(html, i)?;
                i = after_end;
                continue;
            }

            if !self_closing && !is_void_tag(&tag) {
                stack.push(node);
            }
            continue;
        }

        let text_start = i;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }

        if let Some(text) = html.get(text_start..i) {
            if !text.is_empty() {
                let parent = *stack
                    .last()
                    .ok_or_else(|| Error::HtmlParse("missing parent element".into()))?;
                let decoded = decode_html_character_references(text);
                if !decoded.is_empty() {
                    dom.create_text(parent, decoded);
                }
            }
        }
    }

    dom.initialize_form_control_values();
    Ok(dom)
}

fn parse_start_tag(html: &str, open: usize) -> Result<(String, Vec<(String, String)>, bool, usize)> {
    let bytes = html.as_bytes();
    let mut i = open + 1;

    let name_start = i;
    while i < bytes.len() && is_tag_name_char(bytes[i]) {
        i += 1;
    }
    if name_start == i {
        return Err(Error::HtmlParse(format!(
            "malformed start tag at byte {open}"
        )));
    }
    let tag = html
        .get(name_start..i)
        .ok_or_else(|| Error::HtmlParse("non-utf8 tag boundary".into()))?
        .to_string();

    let mut attrs = Vec::new();
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(Error::HtmlParse(format!("unclosed <{tag}> tag")));
        }

        if bytes[i] == b'>' {
            return Ok((tag, attrs, false, i + 1));
        }
        if bytes[i] == b'/' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'>' {
                return Ok((tag, attrs, true, i + 1));
            }
            return Err(Error::HtmlParse(format!("stray '/' inside <{tag}> tag")));
        }

        let attr_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        if attr_start == i {
            return Err(Error::HtmlParse(format!(
                "unexpected character {:?} inside <{tag}> tag",
                bytes[i] as char
            )));
        }
        let name = html
            .get(attr_start..i)
            .ok_or_else(|| Error::HtmlParse("non-utf8 attribute boundary".into()))?
            .to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            attrs.push((name, String::new()));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(Error::HtmlParse(format!("unclosed <{tag}> tag")));
        }

        let value = if bytes[i] == b'"' || bytes[i] == b'\'' {
            let quote = bytes[i];
            i += 1;
            let value_start = i;
            while i < bytes.len() && bytes[i] != quote {
                i += 1;
            }
            if i >= bytes.len() {
                return Err(Error::HtmlParse(format!(
                    "unclosed attribute value in <{tag}> tag"
                )));
            }
            let raw = html
                .get(value_start..i)
                .ok_or_else(|| Error::HtmlParse("non-utf8 attribute boundary".into()))?;
            i += 1;
            decode_html_character_references(raw)
        } else {
            let value_start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                i += 1;
            }
            let raw = html
                .get(value_start..i)
                .ok_or_else(|| Error::HtmlParse("non-utf8 attribute boundary".into()))?;
            decode_html_character_references(raw)
        };
        attrs.push((name, value));
    }
}

fn parse_end_tag(html: &str, open: usize) -> Result<(String, usize)> {
    let bytes = html.as_bytes();
    let mut i = open + 2;
    let name_start = i;
    while i < bytes.len() && is_tag_name_char(bytes[i]) {
        i += 1;
    }
    if name_start == i {
        return Err(Error::HtmlParse(format!("malformed end tag at byte {open}")));
    }
    let tag = html
        .get(name_start..i)
        .ok_or_else(|| Error::HtmlParse("non-utf8 tag boundary".into()))?
        .to_string();
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'>' {
        return Err(Error::HtmlParse(format!("unclosed </{tag}> tag")));
    }
    Ok((tag, i + 1))
}

fn parse_declaration_tag(html: &str, open: usize) -> Result<usize> {
    let bytes = html.as_bytes();
    let mut i = open + 2;
    while i < bytes.len() && bytes[i] != b'>' {
        i += 1;
    }
    if i >= bytes.len() {
        return Err(Error::HtmlParse("unclosed declaration tag".into()));
    }
    Ok(i + 1)
}

pub(crate) fn decode_html_character_references(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }

    fn decode_numeric(value: &str) -> Option<char> {
        let codepoint = if let Some(hex) = value
            .strip_prefix('x')
            .or_else(|| value.strip_prefix('X'))
        {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            value.parse::<u32>().ok()?
        };
        char::from_u32(codepoint)
    }

    fn decode_named(value: &str) -> Option<char> {
        match value {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{00A0}'),
            _ => None,
        }
    }

    let mut out = String::new();
    let bytes = src.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'&' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'&' {
                i += 1;
            }
            if let Some(chunk) = src.get(start..i) {
                out.push_str(chunk);
            }
            continue;
        }

        let tail = &src[i + 1..];
        let end = tail
            .char_indices()
            .take_while(|(offset, ch)| *offset < 32 && (ch.is_ascii_alphanumeric() || *ch == '#'))
            .last()
            .map(|(offset, ch)| offset + ch.len_utf8());
        let decoded = end
            .filter(|end| tail[*end..].starts_with(';'))
            .and_then(|end| {
                let raw = &tail[..end];
                let value = if let Some(rest) = raw.strip_prefix('#') {
                    decode_numeric(rest)
                } else {
                    decode_named(raw)
                };
                value.map(|ch| (ch, end))
            });

        if let Some((ch, end)) = decoded {
            out.push(ch);
            i += end + 2;
        } else {
            out.push('&');
            i += 1;
        }
    }
    out
}

pub(crate) fn escape_text(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for ch in src.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn escape_attr(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for ch in src.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn unescape_string(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

pub(crate) fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_raw_text_tag(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("script")
        || tag.eq_ignore_ascii_case("style")
        || tag.eq_ignore_ascii_case("textarea")
        || tag.eq_ignore_ascii_case("title")
}

fn is_tag_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

fn is_attr_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b':'
}

fn starts_with_at(bytes: &[u8], start: usize, needle: &[u8]) -> bool {
    bytes.len() >= start + needle.len() && &bytes[start..start + needle.len()] == needle
}

fn find_subslice(bytes: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || bytes.len() < needle.len() {
        return None;
    }
    (start..=bytes.len() - needle.len()).find(|&i| &bytes[i..i + needle.len()] == needle)
}

fn find_case_insensitive_raw_end_tag(bytes: &[u8], start: usize, tag: &[u8]) -> Option<usize> {
    let mut i = start;
    while i + tag.len() + 2 <= bytes.len() {
        if bytes[i] == b'<' && bytes[i + 1] == b'/' {
            let candidate = &bytes[i + 2..i + 2 + tag.len()];
            if candidate.eq_ignore_ascii_case(tag) {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_fragment_with_attributes() -> Result<()> {
        let dom = parse_html(
            r#"<div class="wrap" data-action="/cart/add"><input name="amount" value="25"></div>"#,
        )?;
        let div = dom.query_selector("div.wrap")?.unwrap();
        assert_eq!(dom.attr(div, "data-action").as_deref(), Some("/cart/add"));
        let input = dom.query_selector("input[name=amount]")?.unwrap();
        assert_eq!(dom.value(input), "25");
        Ok(())
    }

    #[test]
    fn decodes_character_references_in_text_and_attributes() -> Result<()> {
        let dom = parse_html(r#"<p id="msg" title="a &amp; b">5 &lt; 6 &#33;</p>"#)?;
        let p = dom.query_selector("#msg")?.unwrap();
        assert_eq!(dom.text_content(p), "5 < 6 !");
        assert_eq!(dom.attr(p, "title").as_deref(), Some("a & b"));
        Ok(())
    }

    #[test]
    fn mismatched_end_tag_closes_open_elements() -> Result<()> {
        let dom = parse_html("<div><span>inner</div><p>after</p>")?;
        assert!(dom.query_selector("p")?.is_some());
        Ok(())
    }

    #[test]
    fn unclosed_comment_is_a_parse_error() {
        let err = parse_html("<div><!-- oops").unwrap_err();
        assert!(matches!(err, Error::HtmlParse(_)));
    }

    #[test]
    fn textarea_body_becomes_its_value() -> Result<()> {
        let dom = parse_html("<textarea name='note'>hello &amp; bye</textarea>")?;
        let area = dom.query_selector("textarea")?.unwrap();
        assert_eq!(dom.value(area), "hello & bye");
        Ok(())
    }

    #[test]
    fn void_elements_do_not_nest_following_content() -> Result<()> {
        let dom = parse_html("<input name='a'><p id='after'>x</p>")?;
        let p = dom.query_selector("#after")?.unwrap();
        assert_eq!(dom.text_content(p), "x");
        Ok(())
    }
}
