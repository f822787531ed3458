use std::sync::LazyLock;

use scraper::{Html, Selector};

static TOTAL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.totalNumb.txtMax").unwrap());

/// A parsed receipt page.
pub struct Page {
    doc: Html,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Page {
            doc: Html::parse_document(html),
        }
    }

    /// All text nodes joined by single spaces.
    pub fn text(&self) -> String {
        let joined = self.doc.root_element().text().collect::<Vec<_>>().join(" ");
        collapse_ws(&joined)
    }

    /// Text of the highlighted "total" span, when the layout has one.
    pub fn total_span(&self) -> Option<String> {
        self.doc
            .select(&TOTAL_SEL)
            .map(|el| collapse_ws(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
    }
}

pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
