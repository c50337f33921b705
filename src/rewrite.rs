use kuchikikiki::NodeRef;
use kuchikikiki::traits::TendrilSink;

/// Re-roots relative stylesheet and script URLs in one definition's HTML so
/// they resolve against the static mount for the dictionary's folder:
/// `{mount_base}/{group}/{folder_idx}/{basename}`. A single pass over
/// `<link>`/`<script>` elements; everything else is left as parsed.
///
/// Returns the document element's inner markup, not a full document.
pub fn rewrite(html: &str, mount_base: &str, group: &str, folder_idx: usize) -> String {
    let document = kuchikikiki::parse_html().one(html);
    rewrite_stylesheet_links(&document, mount_base, group, folder_idx);
    rewrite_script_sources(&document, mount_base, group, folder_idx);
    serialize_document_inner(&document)
}

fn rewrite_stylesheet_links(document: &NodeRef, mount_base: &str, group: &str, folder_idx: usize) {
    let Ok(links) = document.select("link") else {
        return;
    };
    for link in links {
        let mut attributes = link.attributes.borrow_mut();
        let is_stylesheet = attributes
            .get("rel")
            .is_some_and(|rel| rel.eq_ignore_ascii_case("stylesheet"));
        if !is_stylesheet {
            continue;
        }
        if let Some(href) = attributes.get("href").map(str::to_string) {
            attributes.insert("href", mounted_url(mount_base, group, folder_idx, &href));
        }
    }
}

fn rewrite_script_sources(document: &NodeRef, mount_base: &str, group: &str, folder_idx: usize) {
    let Ok(scripts) = document.select("script") else {
        return;
    };
    for script in scripts {
        let mut attributes = script.attributes.borrow_mut();
        if let Some(src) = attributes.get("src").map(str::to_string) {
            attributes.insert("src", mounted_url(mount_base, group, folder_idx, &src));
        }
    }
}

/// Strips any relative directory component, keeping only the file name.
fn mounted_url(mount_base: &str, group: &str, folder_idx: usize, original: &str) -> String {
    let basename = original.rsplit('/').next().unwrap_or(original);
    format!("{mount_base}/{group}/{folder_idx}/{basename}")
}

fn serialize_document_inner(document: &NodeRef) -> String {
    let Ok(root) = document.select_first("html") else {
        return String::new();
    };
    let mut out = Vec::new();
    for child in root.as_node().children() {
        if child.serialize(&mut out).is_err() {
            return String::new();
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
