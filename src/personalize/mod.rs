use regex::{Captures, Regex};
use std::sync::LazyLock;

pub const ATTRIBUTE: &str = "data-zoltrak-personalize";
pub const SCRIPT_ID: &str = "zoltrak-live-marketing";

const RUNTIME: &str = r#"(function () {
  document.addEventListener('DOMContentLoaded', function () {
    var targets = document.querySelectorAll('[data-zoltrak-personalize="true"]');
    targets.forEach(function (el) {
      fetch('/api/personalize', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ originalContent: el.innerText, visitorContext: {} })
      })
        .then(function (res) { return res.json(); })
        .then(function (data) {
          if (data && data.personalizedContent) { el.innerText = data.personalizedContent; }
        })
        .catch(function (err) { console.error('Zoltrak live marketing:', err); });
    });
  });
})();"#;

fn runtime_tag() -> String {
    format!("<script id=\"{SCRIPT_ID}\">\n{RUNTIME}\n</script>")
}

/// An opening tag. Quoted attribute values may contain `>`.
static OPENING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<[A-Za-z][A-Za-z0-9-]*(?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*\s*/?>"#)
        .expect("valid regex")
});
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).expect("valid regex")
});

/// Name and value of every attribute in an opening tag.
fn attributes(tag: &str) -> impl Iterator<Item = (&str, &str)> {
    ATTR.captures_iter(tag).filter_map(|c| {
        let name = c.get(1)?.as_str();
        let value = c.get(2).or(c.get(3)).or(c.get(4)).map_or("", |m| m.as_str());
        Some((name, value))
    })
}

fn flag(tag: &str) -> String {
    let attr = format!(" {ATTRIBUTE}=\"true\"");
    match tag.strip_suffix("/>") {
        Some(head) => format!("{}{attr} />", head.trim_end()),
        None => format!("{}{attr}>", &tag[..tag.len() - 1]),
    }
}

/// Marks every element whose id is in `target_ids` and appends the runtime
/// script once. Without targets the html is returned untouched.
pub fn apply(html: &str, target_ids: &[&str]) -> String {
    if target_ids.is_empty() {
        return html.to_string();
    }

    let mut out = OPENING_TAG
        .replace_all(html, |c: &Captures| {
            let tag = &c[0];
            let mut id = None;
            let mut flagged = false;
            for (name, value) in attributes(tag) {
                if name.eq_ignore_ascii_case("id") {
                    id = Some(value);
                }
                flagged |= name.eq_ignore_ascii_case(ATTRIBUTE);
            }
            match id {
                Some(id) if !flagged && target_ids.contains(&id) => flag(tag),
                _ => tag.to_string(),
            }
        })
        .into_owned();

    if !out.contains(&format!("id=\"{SCRIPT_ID}\"")) {
        let script = runtime_tag();
        match out.to_ascii_lowercase().rfind("</body>") {
            Some(at) => out.insert_str(at, &format!("{script}\n")),
            None => {
                out.push('\n');
                out.push_str(&script);
            }
        }
    }
    out
}
