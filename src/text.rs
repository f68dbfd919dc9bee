//! Plain-text extraction from status HTML.
//!
//! Mastodon serves status content as sanitised HTML (`<p>`, `<br />`,
//! `<a>`, `<span>`). Embeddings are computed over the visible text only:
//! paragraphs become blank-line separated, `<br>` becomes a newline, and
//! character references are decoded. Named references cover the full HTML5
//! table (`&hellip;`, `&mdash;`, `&rsquo;`, ...); unknown names are kept as
//! written.

use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Visible text of a status body. Never fails: markup the XML reader
/// cannot handle falls back to dropping everything between `<` and `>`.
pub fn plain_text(html: &str) -> String {
    let text = match extract_with_reader(html) {
        Some(text) => text,
        None => strip_tags(html),
    };
    normalize_newlines(&text.replace('\u{a0}', " "))
}

fn extract_with_reader(html: &str) -> Option<String> {
    let mut reader = Reader::from_str(html);
    reader.config_mut().check_end_names = false;

    let mut out = String::with_capacity(html.len());
    loop {
        match reader.read_event() {
            Ok(Event::Text(te)) => match te.unescape() {
                Ok(text) => out.push_str(&text),
                // An unknown entity somewhere in the run
                Err(_) => out.push_str(&decode_html_entities(&String::from_utf8_lossy(&te))),
            },
            Ok(Event::CData(cd)) => out.push_str(&String::from_utf8_lossy(&cd)),
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"br" => {
                out.push('\n')
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"p" => out.push_str("\n\n"),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    Some(out)
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_html_entities(&out)
}

/// Decode references one at a time. Unresolvable ones and bare `&` stay as is.
fn decode_html_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let resolved = tail[1..]
            .find(';')
            .filter(|&end| end > 0 && end <= 32)
            .and_then(|end| resolve_reference(&tail[1..=end]).map(|text| (text, end + 2)));
        match resolved {
            Some((text, len)) => {
                out.push_str(&text);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_reference(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    resolve_html5_entity(name).map(str::to_string)
}

/// Trim each line and collapse runs of blank lines to one.
fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            pending_blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        pending_blank = false;
        out.push_str(line);
    }
    out
}
