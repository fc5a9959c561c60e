// src/core/html.rs
pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii() {
                c.to_ascii_lowercase()
            } else {
                c
            }
        })
        .collect()
}

/// Byte spans of every `<tag ...>…</tag>` block, case-insensitive.
/// `<b` does not match `<br>` or `<body>`: the tag name must end at `>` or
/// whitespace. Not nesting-aware.
pub fn tag_blocks_ci(doc: &str, tag: &str) -> Vec<(usize, usize)> {
    // ASCII lowercasing keeps byte offsets identical to `doc`.
    let lc = to_lower(doc);
    let open = format!("<{}", to_lower(tag));
    let close = format!("</{}>", to_lower(tag));

    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some(rel) = lc[pos..].find(&open) {
        let start = pos + rel;
        let after_name = start + open.len();
        let boundary = lc[after_name..].chars().next();
        if !matches!(boundary, Some(c) if c == '>' || c.is_whitespace()) {
            pos = after_name;
            continue;
        }
        let Some(end_rel) = lc[after_name..].find(&close) else { break };
        let end = after_name + end_rel + close.len();
        out.push((start, end));
        pos = end;
    }
    out
}

pub fn inner_after_open_tag(block: &str) -> String {
    if let Some(oe) = block.find('>') {
        if let Some(cs) = block.rfind('<') {
            if cs > oe {
                return block[oe + 1..cs].to_string();
            }
        }
    }
    s!()
}

pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();

    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    super::sanitize::normalize_ws(&out)
}

/// Visible text of every `<tag>` block, in document order.
pub fn tag_texts_ci(doc: &str, tag: &str) -> Vec<String> {
    tag_blocks_ci(doc, tag)
        .into_iter()
        .map(|(s, e)| {
            let inner = inner_after_open_tag(&doc[s..e]);
            strip_tags(super::sanitize::normalize_entities(&inner))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_blocks_skip_br_and_body() {
        let doc = "<BODY><br><b>K1A</b> Ottawa<br/><B class=x>k2p</B><b></b></body>";
        assert_eq!(tag_texts_ci(doc, "b"), vec![s!("K1A"), s!("k2p"), s!()]);
    }

    #[test]
    fn nested_markup_is_stripped() {
        let doc = "<td><b><a href=\"/wiki/x\">M5V</a>&nbsp;</b></td>";
        assert_eq!(tag_texts_ci(doc, "b"), vec![s!("M5V")]);
    }

    #[test]
    fn unterminated_block_is_ignored() {
        assert!(tag_texts_ci("<b>K1A", "b").is_empty());
    }
}
