use serde::{Deserialize, Serialize};

/// A news record exactly as the source returned it. Every field is optional here; turning it
/// into an `Article` is the job of `RawArticle::validate_and_into_article`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawArticle {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<RawArticleContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawArticleContent {
    #[serde(default, rename = "pubDate")]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}
