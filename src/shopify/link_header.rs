//! Parser for RFC 8288 `Link` headers as sent by Shopify's REST API:
//!
//! `<https://shop/admin/api/2023-10/orders.json?page_info=abc&limit=250>; rel="next"`
use url::Url;

/// One `<uri>; params` entry of a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkValue<'a> {
    pub target: &'a str,
    pub rels: Vec<&'a str>,
}

/// Split a `Link` header into its link values. Commas inside `<...>` or
/// quoted parameter values do not split.
pub fn parse_links(header: &str) -> Vec<LinkValue<'_>> {
    split_top_level(header)
        .into_iter()
        .filter_map(parse_link_value)
        .collect()
}

/// URL of the first link whose relation list contains `next`.
pub fn parse_next_link(header: &str) -> Option<Url> {
    parse_links(header)
        .into_iter()
        .find(|l| l.rels.iter().any(|r| r.eq_ignore_ascii_case("next")))
        .and_then(|l| Url::parse(l.target).ok())
}

fn split_top_level(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_angle = false;
    let mut in_quote = false;
    let mut start = 0;
    for (i, ch) in header.char_indices() {
        match ch {
            '<' if !in_quote => in_angle = true,
            '>' if !in_quote => in_angle = false,
            '"' if !in_angle => in_quote = !in_quote,
            ',' if !in_angle && !in_quote => {
                parts.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&header[start..]);
    parts
}

fn parse_link_value(raw: &str) -> Option<LinkValue<'_>> {
    let raw = raw.trim();
    let rest = raw.strip_prefix('<')?;
    let close = rest.find('>')?;
    let target = rest[..close].trim();
    if target.is_empty() {
        return None;
    }

    let mut rels = Vec::new();
    for param in rest[close + 1..].split(';') {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("rel") {
            continue;
        }
        let value = value.trim().trim_matches('"');
        rels.extend(value.split_ascii_whitespace());
    }
    Some(LinkValue { target, rels })
}
