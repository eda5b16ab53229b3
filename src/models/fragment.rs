//! Markup fragments taken from the listing table.

/// One element found in a listing table cell.
///
/// Anchors open a new listing row; labels fill in one more attribute of a
/// row opened earlier, addressed by the numeric suffix of their id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Anchor {
        id: String,
        text: String,
        href: String,
    },
    Label {
        id: String,
        text: String,
    },
}

impl Fragment {
    /// Element id the attribute name is derived from.
    pub fn id(&self) -> &str {
        match self {
            Fragment::Anchor { id, .. } | Fragment::Label { id, .. } => id,
        }
    }

    /// Text content of the element.
    pub fn text(&self) -> &str {
        match self {
            Fragment::Anchor { text, .. } | Fragment::Label { text, .. } => text,
        }
    }
}
