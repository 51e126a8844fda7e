use super::*;

pub(crate) fn is_form_control(dom: &Dom, node_id: NodeId) -> bool {
    let Some(element) = dom.element(node_id) else {
        return false;
    };

    element.tag_name.eq_ignore_ascii_case("input")
        || element.tag_name.eq_ignore_ascii_case("select")
        || element.tag_name.eq_ignore_ascii_case("textarea")
        || element.tag_name.eq_ignore_ascii_case("button")
}

pub(crate) fn is_checkbox_input(dom: &Dom, node_id: NodeId) -> bool {
    input_type_is(dom, node_id, "checkbox")
}

pub(crate) fn is_radio_input(dom: &Dom, node_id: NodeId) -> bool {
    input_type_is(dom, node_id, "radio")
}

fn input_type_is(dom: &Dom, node_id: NodeId, kind: &str) -> bool {
    let Some(element) = dom.element(node_id) else {
        return false;
    };

    if !element.tag_name.eq_ignore_ascii_case("input") {
        return false;
    }

    element
        .attr("type")
        .map(|value| value.eq_ignore_ascii_case(kind))
        .unwrap_or(false)
}

pub(crate) fn is_submit_control(dom: &Dom, node_id: NodeId) -> bool {
    let Some(element) = dom.element(node_id) else {
        return false;
    };

    if element.tag_name.eq_ignore_ascii_case("button") {
        return element
            .attr("type")
            .map(|kind| kind.eq_ignore_ascii_case("submit"))
            .unwrap_or(true);
    }

    if element.tag_name.eq_ignore_ascii_case("input") {
        return element
            .attr("type")
            .map(|kind| kind.eq_ignore_ascii_case("submit") || kind.eq_ignore_ascii_case("image"))
            .unwrap_or(false);
    }

    false
}

pub(crate) fn collect_form_controls(dom: &Dom, node: NodeId, out: &mut Vec<NodeId>) {
    for child in &dom.nodes[node.0].children {
        if is_form_control(dom, *child) {
            out.push(*child);
        }
        collect_form_controls(dom, *child, out);
    }
}

/// The form data snapshot: `(name, value)` pairs for every successful control
/// under `scope`, in document order.
pub(crate) fn form_data_entries(dom: &Dom, scope: NodeId) -> Vec<(String, String)> {
    let mut controls = Vec::new();
    collect_form_controls(dom, scope, &mut controls);

    let mut out = Vec::new();
    for control in controls {
        if !is_successful_control(dom, control) {
            continue;
        }
        let name = dom.attr(control, "name").unwrap_or_default();
        out.push((name, control_value(dom, control)));
    }
    out
}

fn is_successful_control(dom: &Dom, control: NodeId) -> bool {
    if dom.disabled(control) {
        return false;
    }
    let name = dom.attr(control, "name").unwrap_or_default();
    if name.is_empty() {
        return false;
    }

    let Some(tag) = dom.tag_name(control) else {
        return false;
    };

    if tag.eq_ignore_ascii_case("button") {
        return false;
    }

    if tag.eq_ignore_ascii_case("input") {
        let kind = dom
            .attr(control, "type")
            .unwrap_or_default()
            .to_ascii_lowercase();
        if matches!(
            kind.as_str(),
            "button" | "submit" | "reset" | "file" | "image"
        ) {
            return false;
        }
        if kind == "checkbox" || kind == "radio" {
            return dom.checked(control);
        }
    }

    true
}

fn control_value(dom: &Dom, control: NodeId) -> String {
    let value = dom.value(control);
    if value.is_empty() && (is_checkbox_input(dom, control) || is_radio_input(dom, control)) {
        return "on".into();
    }
    value
}

/// Encodes a snapshot as an `application/x-www-form-urlencoded` body.
pub fn url_encode_form(entries: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, value) in entries {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(&encode_component(name));
        out.push('=');
        out.push_str(&encode_component(value));
    }
    out
}

fn encode_component(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for byte in src.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'*' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(hex_digit(byte >> 4));
                out.push(hex_digit(byte & 0x0F));
            }
        }
    }
    out
}

fn hex_digit(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => (b'A' + nibble - 10) as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_html;

    fn entries_for(html: &str) -> Vec<(String, String)> {
        let dom = parse_html(html).unwrap();
        let form = dom.query_selector("form").unwrap().unwrap();
        form_data_entries(&dom, form)
    }

    #[test]
    fn snapshot_keeps_document_order() {
        let entries = entries_for(
            r#"<form>
                <input name="amount" value="25">
                <select name="currency"><option value="EUR" selected>E</option></select>
                <textarea name="message">hi</textarea>
               </form>"#,
        );
        assert_eq!(
            entries,
            vec![
                ("amount".to_string(), "25".to_string()),
                ("currency".to_string(), "EUR".to_string()),
                ("message".to_string(), "hi".to_string()),
            ]
        );
    }

    #[test]
    fn disabled_unnamed_and_button_controls_are_skipped() {
        let entries = entries_for(
            r#"<form>
                <input name="kept" value="1">
                <input name="off" value="2" disabled>
                <input value="3">
                <input type="submit" name="go" value="Go">
                <button name="btn" value="4">B</button>
               </form>"#,
        );
        assert_eq!(entries, vec![("kept".to_string(), "1".to_string())]);
    }

    #[test]
    fn checkboxes_count_only_when_checked_and_default_to_on() {
        let entries = entries_for(
            r#"<form>
                <input type="checkbox" name="a" checked>
                <input type="checkbox" name="b">
                <input type="radio" name="c" value="x" checked>
               </form>"#,
        );
        assert_eq!(
            entries,
            vec![
                ("a".to_string(), "on".to_string()),
                ("c".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn url_encoding_escapes_reserved_bytes() {
        let entries = vec![
            ("gift card".to_string(), "A&B=C".to_string()),
            ("note".to_string(), "50€".to_string()),
        ];
        assert_eq!(
            url_encode_form(&entries),
            "gift+card=A%26B%3DC&note=50%E2%82%AC"
        );
    }

    #[test]
    fn empty_snapshot_encodes_to_empty_body() {
        assert_eq!(url_encode_form(&[]), "");
    }
}
