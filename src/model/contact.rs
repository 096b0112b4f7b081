use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;
use url::Url;

/// The sender of an incoming message, as far as its view needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub id: String,
    /// The display name, if the contact has one.
    pub name: Option<String>,
    /// A URL to the contact's avatar image.
    pub avatar_url: Option<String>,
    /// One of the conversation colour classes, e.g., `"blue"`.
    pub color: Option<String>,
}

/// What the avatar template needs: either an image or an initial on a colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Avatar {
    pub url: Option<String>,
    pub color: Option<String>,
    pub content: String,
}

/// Returns the first grapheme of `name`, uppercased, skipping a leading `@` or `+`.
pub fn first_letter(name: &str) -> Option<String> {
    name.trim_start_matches(['@', '+'])
        .graphemes(true)
        .find(|g| !g.trim().is_empty())
        .map(str::to_uppercase)
}

impl Contact {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// The display name, falling back to the contact's ID.
    pub fn title(&self) -> &str {
        self.name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or(&self.id)
    }

    /// The avatar to draw. An unparseable `avatar_url` falls back to the initial.
    pub fn avatar(&self) -> Avatar {
        let url = self.avatar_url
            .as_deref()
            .filter(|u| Url::parse(u).is_ok())
            .map(str::to_string);
        Avatar {
            url,
            color: self.color.clone(),
            content: first_letter(self.title()).unwrap_or_else(|| "#".to_string()),
        }
    }
}
